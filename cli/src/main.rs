use anyhow::{Context, Result, bail};
use burn2::{
    Config, MemoryImage, Truncation,
    adapter::{AdapterDescriptor, MatchPolicy},
    serial,
};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::{
    fs::File,
    io::{self, BufRead, BufWriter, IsTerminal, Write},
    path::{Path, PathBuf},
    time::Duration,
};

// Matches the size of a full transfer
const WRITE_BUFFER_SIZE: usize = 64_000;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Output filename for the memory image
    #[arg(required_unless_present = "list")]
    output: Option<PathBuf>,

    /// Truncate the image (32k, 56k or full). Prompts if omitted.
    #[arg(short, long, value_parser = parse_truncation)]
    trim: Option<Truncation>,

    /// Serial port path, skipping adapter detection (e.g. /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,

    /// USB vendor ID of the adapter (hex format)
    #[arg(long, value_parser = parse_hex, default_value = "0403")]
    vendor_id: u16,

    /// USB product ID of the adapter (hex format)
    #[arg(long, value_parser = parse_hex, default_value = "6001")]
    product_id: u16,

    /// Require both vendor and product ID to match
    #[arg(long)]
    strict_vendor: bool,

    /// Read timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// List serial adapters and exit
    #[arg(short, long)]
    list: bool,
}

fn parse_hex(s: &str) -> Result<u16, std::num::ParseIntError> {
    if let Some(stripped) = s.strip_prefix("0x") {
        u16::from_str_radix(stripped, 16)
    } else {
        u16::from_str_radix(s, 16)
    }
}

fn parse_truncation(s: &str) -> Result<Truncation, String> {
    Truncation::parse::<io::Error>(s)
        .map_err(|err| format!("{err}: expected 32k, 56k or full"))
}

/// Asks for the output size on the terminal.
///
/// Any answer other than 2 or 3 keeps the full image.
fn prompt_truncation() -> Result<Truncation> {
    println!("Select output size:");
    println!("1. Full (no trimming)");
    println!("2. Trim to 56 KB");
    println!("3. Trim to 32 KB");
    print!("Enter choice (1/2/3): ");
    io::stdout().flush()?;

    let mut choice = String::new();
    io::stdin().lock().read_line(&mut choice)?;

    Ok(match choice.trim() {
        "2" => Truncation::Trim56k,
        "3" => Truncation::Trim32k,
        _ => Truncation::Full,
    })
}

fn list_adapters() -> Result<()> {
    let adapters = serial::list_adapters().context("Failed to enumerate serial adapters")?;

    if adapters.is_empty() {
        println!("No serial adapters found");
    }

    for adapter in adapters {
        println!("{adapter}");
    }

    Ok(())
}

fn write_image(path: &Path, image: &MemoryImage) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

    writer.write_all(image)?;
    writer.flush()?;

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.list {
        return list_adapters();
    }

    let Some(output) = args.output else {
        bail!("No output filename given");
    };

    let truncation = match args.trim {
        Some(trim) => trim,
        None if io::stdin().is_terminal() => prompt_truncation()?,
        None => Truncation::Full,
    };

    let config = Config {
        read_timeout: Duration::from_millis(args.timeout_ms),
        ..Config::default()
    };

    let adapter = match args.port {
        Some(path) => AdapterDescriptor::other(path),
        None => {
            let policy = if args.strict_vendor {
                MatchPolicy::VendorAndProduct
            } else {
                MatchPolicy::ProductOnly
            };

            serial::find_adapter(args.vendor_id, args.product_id, policy)
                .context("FTDI device not found")?
        }
    };

    info!("Using device: {}", adapter.path);

    let image = serial::read_image(&adapter, &config, truncation)
        .with_context(|| format!("Failed to read device on {}", adapter.path))?;

    write_image(&output, &image)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Done. Output written to {} ({} bytes)",
        output.display(),
        image.len()
    );

    Ok(())
}
