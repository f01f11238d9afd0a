use std::io::IsTerminal;

use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One compact JSON document per line.
    Json,
    /// Indented JSON, for humans.
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Render a reply value for stdout.
pub fn render(value: &Value, format: OutputFormat) -> String {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string(value),
        OutputFormat::Pretty => serde_json::to_string_pretty(value),
    };
    rendered.unwrap_or_else(|_| "null".to_string())
}

pub fn print_value(value: &Value, format: OutputFormat) {
    println!("{}", render(value, format));
}

/// Status line printed by `serve` once the listener is bound.
#[derive(Serialize)]
struct Listening<'a> {
    event: &'static str,
    network: &'a str,
    address: &'a str,
}

pub fn print_listening(network: &str, address: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let line = Listening {
                event: "listening",
                network,
                address,
            };
            println!(
                "{}",
                serde_json::to_string(&line).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => println!("listening on {network} {address}"),
    }
}
