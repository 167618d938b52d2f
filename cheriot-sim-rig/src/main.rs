use cheriot_sim_core::decode::CheriotDecoder;
use cheriot_sim_core::memory::TaggedMemory;
use cheriot_sim_core::state::{CheriotState, Config};
use cheriot_sim_rig::serve_connection;
use clap::Parser;
use goblin::elf::program_header::PT_LOAD;
use log::info;
use std::cell::Cell;
use std::fs::File;
use std::io::Read;
use std::net::TcpListener;
use std::rc::Rc;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Serve the trace protocol for a reference tester on this port.
    #[arg(long, short)]
    trace_port: Option<u16>,
    /// Run an ELF image standalone instead of serving the trace protocol.
    #[arg(long, short)]
    elf: Option<String>,
    /// Stop a standalone run after this many instructions.
    #[arg(long, default_value_t = 1_000_000)]
    max_steps: u64,
}

fn main() -> std::io::Result<()> {
    env_logger::init();
    let args = Args::parse();
    if let Some(port) = args.trace_port {
        return serve(port);
    }
    if let Some(elf) = &args.elf {
        return run_elf(elf, args.max_steps);
    }
    eprintln!("either --trace-port or --elf must be given");
    std::process::exit(1);
}

/// Accept one tester connection and speak the trace protocol on it.
fn serve(port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    info!("listening for a trace connection on port {port}");
    let (stream, peer) = listener.accept()?;
    info!("trace connection from {peer}");
    serve_connection(stream)
}

/// Load an ELF's PT_LOAD segments into tagged memory and free-run the core
/// until it ceases, executes wfi, or exhausts the step budget.
fn run_elf(path: &str, max_steps: u64) -> std::io::Result<()> {
    let mut buf = Vec::new();
    File::open(path)?.read_to_end(&mut buf)?;
    let elf = goblin::elf::Elf::parse(&buf).expect("failed to parse elf file");

    let segments: Vec<_> = elf
        .program_headers
        .iter()
        .filter(|header| header.p_type == PT_LOAD && header.p_memsz > 0)
        .collect();
    assert!(!segments.is_empty(), "elf has no loadable segments");
    let start = segments
        .iter()
        .map(|header| header.p_paddr as u32)
        .min()
        .unwrap()
        & !0xFFF;
    let end = segments
        .iter()
        .map(|header| header.p_paddr + header.p_memsz)
        .max()
        .unwrap() as u32;
    // Leave some slack above the image for stack and heap.
    let size = (end - start + 0x2_0000 + 7) & !7;

    let mut state = CheriotState::new(
        TaggedMemory::new(start, size),
        Config {
            reset_vector: elf.entry as u32,
            ..Config::default()
        },
    );
    for header in &segments {
        state
            .dbg_store_memory(header.p_paddr as u32, &buf[header.file_range()])
            .expect("segment outside the memory window");
    }

    let halted = Rc::new(Cell::new(false));
    let on_wfi = halted.clone();
    state.set_on_wfi(Box::new(move |_| {
        on_wfi.set(true);
        true
    }));

    let decoder = CheriotDecoder::new();
    let mut steps = 0;
    while steps < max_steps && !state.ceased() && !halted.get() {
        state.step(&decoder);
        steps += 1;
    }
    info!(
        "stopped after {steps} instructions at pc {:#010x}",
        state.pcc().address()
    );
    println!(
        "retired {} instructions, final pc {:#010x}",
        state.retired_instructions(),
        state.pcc().address()
    );
    Ok(())
}
