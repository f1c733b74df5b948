use clap::{ArgAction, Parser, Subcommand};
use cob2row::{
    BindingRegistry, Cob2RowConfig, CompositeIdentifier, HostCharset, LoaderManager,
    PluginLocation, RecordUnmarshaller, SimpleConverters,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "cob2row")]
#[command(about = "Discover COBOL bindings and decode host records into rows")]
struct Cli {
    /// Install root; defaults to $COB2ROW_PLUGIN_FOLDER or ./plugins/cob2row.
    #[arg(long, global = true)]
    plugin_folder: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Scan(ScanArgs),
    Classpath(ClasspathArgs),
    Decode(DecodeArgs),
}

#[derive(clap::Args, Debug)]
struct ScanArgs {
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct ClasspathArgs {
    /// Folder to list instead of the plugin's lib folder.
    #[arg(long)]
    folder: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct DecodeArgs {
    /// Binding as `identifier[artifact]`.
    #[arg(long)]
    binding: String,
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    width: usize,
    #[arg(long)]
    charset: Option<String>,
}

#[derive(Serialize)]
struct DecodedLine<'a> {
    bytes: usize,
    row: &'a [cob2row::Value],
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let result = PluginLocation::resolve(cli.plugin_folder.clone())
        .map_err(|error| error.to_string())
        .and_then(|location| {
            let config =
                Cob2RowConfig::load(&location.conf_file()).map_err(|error| error.to_string())?;
            match cli.command {
                Commands::Scan(args) => scan_command(&location, &config, args),
                Commands::Classpath(args) => classpath_command(&location, &config, args),
                Commands::Decode(args) => decode_command(&location, &config, args),
            }
        });

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

fn scan_command(
    location: &PluginLocation,
    config: &Cob2RowConfig,
    args: ScanArgs,
) -> Result<ExitCode, String> {
    let found = config
        .scanner()
        .scan(&location.user_folder())
        .map_err(|e| e.to_string())?;
    if args.json {
        let json = serde_json::to_string_pretty(&found).map_err(|e| e.to_string())?;
        println!("{json}");
    } else {
        for id in &found {
            println!("{id}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn classpath_command(
    location: &PluginLocation,
    config: &Cob2RowConfig,
    args: ClasspathArgs,
) -> Result<ExitCode, String> {
    let folder = args.folder.unwrap_or_else(|| location.lib_folder());
    let classpath = config
        .scanner()
        .classpath(&folder)
        .map_err(|e| e.to_string())?;
    println!("{classpath}");
    Ok(ExitCode::SUCCESS)
}

fn decode_command(
    location: &PluginLocation,
    config: &Cob2RowConfig,
    args: DecodeArgs,
) -> Result<ExitCode, String> {
    let converters = match args.charset.as_deref() {
        Some(name) => {
            let charset = name.parse::<HostCharset>().map_err(|e| e.to_string())?;
            SimpleConverters::new(charset)
        }
        None => config.converters().map_err(|e| e.to_string())?,
    };
    let data = std::fs::read(&args.input)
        .map_err(|e| format!("failed reading input '{}': {e}", args.input.display()))?;

    let manager = LoaderManager::new(
        location.user_folder(),
        Arc::new(BindingRegistry::new("cob2row")),
    );
    let binding = manager
        .new_binding(&CompositeIdentifier::parse(&args.binding))
        .map_err(|e| e.to_string())?;
    let unmarshaller = if config.check_target_width {
        RecordUnmarshaller::new(binding, converters, args.width).map_err(|e| e.to_string())?
    } else {
        RecordUnmarshaller::unchecked(binding, converters, args.width)
    };

    let mut count = 0usize;
    for record in unmarshaller.records(&data) {
        let (row, status) = record.map_err(|e| format!("record {}: {e}", count + 1))?;
        let line = DecodedLine {
            bytes: status.bytes_consumed,
            row: &row,
        };
        println!(
            "{}",
            serde_json::to_string(&line).map_err(|e| e.to_string())?
        );
        count += 1;
    }
    tracing::info!(records = count, binding = %args.binding, "decode complete");
    Ok(ExitCode::SUCCESS)
}
