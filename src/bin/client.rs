#![deny(rust_2018_idioms)]

//! Command-line access to SCGI/XML-RPC endpoints and bencode files.

use std::fmt::{self, Write as _};
use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use tracing_subscriber::EnvFilter;

use scgi_xmlrpc::bencode;
use scgi_xmlrpc::{SCGIRequest, Value};

#[derive(Debug, Parser)]
#[command(name = "scgi-client", version, about)]
struct Args {
    /// Endpoint: host:port, /path/to.sock, ~/path/to.sock or scgi+ssh://[user@]host[:port]/path
    #[arg(short, long, env = "SCGI_URL", global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Call an XML-RPC method and print its result.
    Call {
        /// Method name, e.g. system.client_version
        method: String,

        /// Parameters; integers are sent as <i4> or <i8>, everything else as <string>
        params: Vec<String>,

        /// Print the response document instead of the decoded value.
        #[arg(long)]
        raw: bool,
    },

    /// Send stdin as the body of a single SCGI request and print the response body.
    Send {
        /// Extra SCGI header, may be repeated
        #[arg(short = 'H', long = "header", value_name = "NAME=VALUE", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Also print the response headers, to stderr.
        #[arg(short, long)]
        include: bool,
    },

    /// Decode a bencode file and print its structure.
    Bdecode {
        file: PathBuf,

        /// Character encoding for strings, e.g. utf-8 or windows-1252
        #[arg(long, value_name = "LABEL")]
        encoding: Option<String>,
    },
}

fn parse_header(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", arg))
}

fn parse_param(arg: &str) -> Value {
    match arg.parse::<i64>() {
        Ok(i) => i32::try_from(i).map_or(Value::Int64(i), Value::Int),
        Err(_) => Value::from(arg),
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let url = || {
        args.url
            .as_deref()
            .ok_or_else(|| eyre!("no endpoint given, use --url or set SCGI_URL"))
    };

    match &args.command {
        Command::Call { method, params, raw } => {
            let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();
            let mut client = SCGIRequest::new(url()?)?;
            if *raw {
                println!("{}", client.call_xml(method, &params)?);
            } else {
                let value = client.call(method, &params)?;
                let mut out = String::new();
                format_value(&mut out, &value, 0)?;
                println!("{}", out);
            }
            tracing::debug!(latency = ?client.latency(), "call finished");
        }
        Command::Send { headers, include } => {
            let mut payload = Vec::new();
            io::stdin().read_to_end(&mut payload)?;
            let mut client = headers
                .iter()
                .fold(SCGIRequest::new(url()?)?, |client, (name, value)| {
                    client.with_header(name, value)
                });
            let body = client.send(&payload)?;
            if *include {
                write_headers(io::stderr().lock(), client.response_headers())?;
            } else {
                for (name, value) in client.response_headers() {
                    tracing::debug!(%name, %value, "response header");
                }
            }
            io::stdout().write_all(&body)?;
        }
        Command::Bdecode { file, encoding } => {
            let value = match encoding {
                None => bencode::read_file(file)?,
                Some(label) => {
                    let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
                        .ok_or_else(|| eyre!("unknown encoding {:?}", label))?;
                    let data = std::fs::read(file)
                        .wrap_err_with(|| format!("cannot read {}", file.display()))?;
                    bencode::decode_with(&data, encoding)?
                }
            };
            println!("{:#?}", value);
        }
    }
    Ok(())
}

fn write_headers<W: Write>(mut out: W, headers: &[(String, String)]) -> io::Result<()> {
    for (name, value) in headers {
        writeln!(out, "{}: {}", name, value)?;
    }
    writeln!(out)
}

fn format_value(out: &mut String, value: &Value, depth: usize) -> fmt::Result {
    let indent = "    ".repeat(depth);
    match value {
        Value::Array(items) => {
            out.push_str("[\n");
            for item in items {
                write!(out, "{}    ", indent)?;
                format_value(out, item, depth + 1)?;
                out.push_str(",\n");
            }
            write!(out, "{}]", indent)
        }
        Value::Struct(members) => {
            out.push_str("{\n");
            for (name, item) in members {
                write!(out, "{}    {:?}: ", indent, name)?;
                format_value(out, item, depth + 1)?;
                out.push_str(",\n");
            }
            write!(out, "{}}}", indent)
        }
        Value::String(s) => write!(out, "{:?}", s),
        Value::Int(i) => write!(out, "{}", i),
        Value::Int64(i) => write!(out, "{}", i),
        Value::Bool(b) => write!(out, "{}", b),
        Value::Double(d) => write!(out, "{}", d),
        other => write!(out, "{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_headers_are_opt_in() {
        let args = Args::try_parse_from(["scgi-client", "send", "-H", "A=b"]).unwrap();
        assert!(matches!(args.command, Command::Send { include: false, .. }));

        let args = Args::try_parse_from(["scgi-client", "send", "--include"]).unwrap();
        assert!(matches!(args.command, Command::Send { include: true, .. }));
    }

    #[test]
    fn headers_print_like_http() {
        let mut out = Vec::new();
        let headers = [
            ("Status".to_owned(), "200 OK".to_owned()),
            ("Content-Type".to_owned(), "text/xml".to_owned()),
        ];
        write_headers(&mut out, &headers).unwrap();
        assert_eq!(out, b"Status: 200 OK\nContent-Type: text/xml\n\n");
    }

    #[test]
    fn values_print_indented() {
        let value = Value::Array(vec![Value::Int(1), Value::String("a".to_owned())]);
        let mut out = String::new();
        format_value(&mut out, &value, 0).unwrap();
        assert_eq!(out, "[\n    1,\n    \"a\",\n]");
    }

    #[test]
    fn params_pick_the_smallest_integer_type() {
        assert_eq!(parse_param("42"), Value::Int(42));
        assert_eq!(parse_param("5000000000"), Value::Int64(5_000_000_000));
        assert_eq!(parse_param("d.name"), Value::String("d.name".to_owned()));
    }
}
