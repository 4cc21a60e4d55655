//! Headless Genesis runner.
//!
//! Loads a raw cartridge image, runs a number of frames and prints the CPU
//! state and translation cache counters. Optionally captures PSG audio.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use emu_core::Observable;
use machine_genesis::{AUDIO_SAMPLE_RATE, Genesis, GenesisConfig, Region};

struct CliArgs {
    rom_path: Option<PathBuf>,
    frames: u32,
    region: Region,
    z80_enabled: bool,
    audio_path: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        rom_path: None,
        frames: 60,
        region: Region::Ntsc,
        z80_enabled: true,
        audio_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rom" => {
                i += 1;
                cli.rom_path = args.get(i).map(PathBuf::from);
            }
            "--frames" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.frames = s.parse().unwrap_or(60);
                }
            }
            "--pal" => cli.region = Region::Pal,
            "--no-z80" => cli.z80_enabled = false,
            "--audio" => {
                i += 1;
                cli.audio_path = args.get(i).map(PathBuf::from);
            }
            "--help" | "-h" => {
                eprintln!("Usage: genesis-runner --rom <file> [options]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --rom <file>     Raw cartridge image (.bin/.md)");
                eprintln!("  --frames <n>     Frames to run [default: 60]");
                eprintln!("  --pal            PAL timing (default NTSC)");
                eprintln!("  --no-z80         Keep the Z80 halted");
                eprintln!("  --audio <file>   Save PSG output as WAV");
                process::exit(0);
            }
            other => {
                // Bare path: treat as the ROM.
                if cli.rom_path.is_none() && !other.starts_with('-') {
                    cli.rom_path = Some(PathBuf::from(other));
                } else {
                    eprintln!("Unknown option: {other}");
                    process::exit(1);
                }
            }
        }
        i += 1;
    }
    cli
}

/// Write mono f32 samples as 16-bit PCM.
fn save_audio(samples: &[f32], path: &Path) -> Result<(), Box<dyn Error>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: AUDIO_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * f32::from(i16::MAX)) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

fn print_state(genesis: &Genesis) {
    let field = |path: &str| {
        genesis
            .query(path)
            .map_or_else(|| "?".to_string(), |v| v.to_string())
    };
    println!(
        "68000  PC={} SR={} A7={} cycle={}",
        field("m68k.pc"),
        field("m68k.sr"),
        field("m68k.a7"),
        genesis.m68k().current_cycle()
    );
    println!(
        "Z80    PC={} SP={} AF={}{} bank={} busreq={} reset={}",
        field("z80.pc"),
        field("z80.sp"),
        field("z80.a"),
        field("z80.f"),
        field("z80_bank"),
        field("z80_busreq"),
        field("z80_reset"),
    );
    println!("VDP    frame={} line={}", genesis.vdp().frame(), genesis.vdp().line());
    for (name, stats) in [("68000", genesis.m68k().stats()), ("Z80", genesis.z80().stats())] {
        println!(
            "{name:<6} blocks={} instructions={} invalidations={} retranslations={}",
            stats.blocks, stats.instructions, stats.invalidations, stats.retranslations
        );
    }
}

fn run(cli: &CliArgs) -> Result<(), Box<dyn Error>> {
    let rom_path = cli.rom_path.as_deref().ok_or("no ROM given (use --rom <file>)")?;
    let rom = std::fs::read(rom_path)
        .map_err(|e| format!("failed to read {}: {e}", rom_path.display()))?;

    let mut config = GenesisConfig::new(rom);
    config.region = cli.region;
    config.z80_enabled = cli.z80_enabled;
    let mut genesis = Genesis::new(config)?;

    let mut audio = Vec::new();
    for frame in 0..cli.frames {
        if let Err(e) = genesis.run_frame() {
            print_state(&genesis);
            return Err(format!("frame {frame}: {e}").into());
        }
        if cli.audio_path.is_some() {
            audio.extend(genesis.take_audio());
        } else {
            let _ = genesis.take_audio();
        }
    }

    print_state(&genesis);
    if let Some(path) = &cli.audio_path {
        save_audio(&audio, path)?;
        eprintln!("Audio saved to {}", path.display());
    }
    Ok(())
}

fn main() {
    let cli = parse_args();
    if let Err(e) = run(&cli) {
        eprintln!("{e}");
        process::exit(1);
    }
}
