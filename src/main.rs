mod commands;
mod logging;

use std::{
    io::{BufRead, Write},
    path::PathBuf,
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use storage::{
    Session,
    fs::{
        dev::ImageFile,
        fat::{FormatOptions, format},
    },
};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Parser)]
#[command(name = "fatvol")]
#[command(about = "Interactive shell over a FAT32 disk image")]
struct Cli {
    /// Disk image to mount
    image: PathBuf,
    /// error, warn, info, debug or trace (falls back to FATVOL_LOG)
    #[arg(long = "log-level")]
    log_level: Option<String>,
    /// Create a fresh volume of this many MiB before mounting
    #[arg(long, value_name = "MIB")]
    format: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = logging::resolve_level(cli.log_level.as_deref()).map_err(|e| anyhow!(e))?;
    logging::init(level).map_err(|e| anyhow!("installing logger: {e}"))?;

    let image = match cli.format {
        Some(size) => {
            let bytes = size.checked_mul(MIB).context("image size overflows")?;
            let mut image = ImageFile::create(&cli.image, bytes)
                .with_context(|| format!("creating {}", cli.image.display()))?;
            format(&mut image, &FormatOptions::default())
                .with_context(|| format!("formatting {}", cli.image.display()))?;
            image
        }
        None => ImageFile::open(&cli.image)
            .with_context(|| format!("opening {}", cli.image.display()))?,
    };
    let mut session = Session::mount(image)
        .with_context(|| format!("mounting {}", cli.image.display()))?;

    let name = cli.image.display().to_string();
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut lines = stdin.lock().lines();
    loop {
        write!(stdout, "{name}{}> ", session.path())?;
        stdout.flush()?;

        let Some(line) = lines.next().transpose()? else {
            writeln!(stdout)?;
            break;
        };
        let (command, args) = commands::parse_command_line(&line);
        if matches!(command.as_str(), "exit" | "quit") {
            break;
        }

        let mut out = String::new();
        let result = commands::execute_command(&mut session, &command, &args, &mut out);
        stdout.write_all(out.as_bytes())?;
        if let Err(message) = result {
            writeln!(stdout, "Error: {message}")?;
        }
    }

    log::info!("Leaving {name}");
    session
        .into_inner()
        .sync()
        .with_context(|| format!("syncing {name}"))?;
    Ok(())
}
