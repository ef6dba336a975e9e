use anyhow::Result;
use clap::{Parser, Subcommand};
use tapcommit::commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tapcommit")]
#[command(about = "Taproot commitments: key tweaks, MuSig and script trees", long_about = None)]
struct Cli {
    /// Log debug events from the core (overrides RUST_LOG)
    #[arg(long, global = true, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tweak a key pair by an explicit scalar and sign with it
    Tweak {
        /// Secret key in hex (random if omitted)
        #[arg(long)]
        secret: Option<String>,

        /// Tweak scalar in hex (32 bytes)
        #[arg(long)]
        tweak: String,

        /// Message to sign
        #[arg(long, default_value = "hello taproot")]
        message: String,
    },

    /// Commit to data with a pay-to-contract tweak
    Commit {
        /// Secret key in hex (random if omitted)
        #[arg(long)]
        secret: Option<String>,

        /// Data to commit to
        #[arg(long)]
        data: String,

        /// Message to sign with the output key
        #[arg(long, default_value = "hello taproot")]
        message: String,
    },

    /// Show that a raw tweak can be re-opened to other data
    ForgeDemo {
        /// Secret key in hex (random if omitted)
        #[arg(long)]
        secret: Option<String>,

        /// Data originally committed to
        #[arg(long)]
        data: String,

        /// Data the forger claims instead
        #[arg(long)]
        alternate: String,
    },

    /// Run an n-of-n MuSig session in process
    MusigDemo {
        /// Number of participants (at least 2)
        #[arg(long, default_value = "3")]
        n_parties: usize,

        /// Message to sign
        #[arg(long, default_value = "hello taproot")]
        message: String,

        /// Script tree root to commit the aggregate key to (32 bytes hex)
        #[arg(long)]
        merkle_root: Option<String>,
    },

    /// Build a Huffman TapTree from a JSON description
    Taptree {
        /// Path to the tree JSON file
        #[arg(long)]
        tree: String,
    },

    /// Compute and sign key-path and script-path sighashes for a sample spend
    SighashDemo {
        /// Internal secret key in hex (random if omitted)
        #[arg(long)]
        secret: Option<String>,

        /// Hash type byte, hex or decimal (0x00, 0x01-0x03, 0x81-0x83)
        #[arg(long, default_value = "0x00", value_parser = parse_hash_type)]
        hash_type: u8,

        /// Amount of the spent output in satoshis
        #[arg(long, default_value = "100000")]
        amount: u64,
    },
}

/// Accepts `0x81` or `129`.
fn parse_hash_type(arg: &str) -> std::result::Result<u8, String> {
    let parsed = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex_digits) => u8::from_str_radix(hex_digits, 16),
        None => arg.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid hash type '{arg}': {e}"))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Tweak {
            secret,
            tweak,
            message,
        } => {
            commands::tweak(secret.as_deref(), &tweak, &message)?;
        }
        Commands::Commit {
            secret,
            data,
            message,
        } => {
            commands::commit(secret.as_deref(), &data, &message)?;
        }
        Commands::ForgeDemo {
            secret,
            data,
            alternate,
        } => {
            commands::forge_demo(secret.as_deref(), &data, &alternate)?;
        }
        Commands::MusigDemo {
            n_parties,
            message,
            merkle_root,
        } => {
            commands::musig_demo(n_parties, &message, merkle_root.as_deref())?;
        }
        Commands::Taptree { tree } => {
            commands::taptree(&tree)?;
        }
        Commands::SighashDemo {
            secret,
            hash_type,
            amount,
        } => {
            commands::sighash_demo(secret.as_deref(), hash_type, amount)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hash_type_hex_and_decimal() {
        assert_eq!(parse_hash_type("0x81").unwrap(), 0x81);
        assert_eq!(parse_hash_type("0X03").unwrap(), 0x03);
        assert_eq!(parse_hash_type("131").unwrap(), 0x83);
        assert_eq!(parse_hash_type("0").unwrap(), 0x00);
        assert!(parse_hash_type("0x100").is_err());
        assert!(parse_hash_type("abc").is_err());
    }
}
