use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use pay_kernel::{
    BaseClient, Casted, Config, DownloadDescriptor, HashAlgorithm, Method, Query, Reply,
    RequestOptions,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, ValueEnum)]
enum HashType {
    Sha256,
    Sha1,
}

impl From<HashType> for HashAlgorithm {
    fn from(value: HashType) -> Self {
        match value {
            HashType::Sha256 => HashAlgorithm::Sha256,
            HashType::Sha1 => HashAlgorithm::Sha1,
        }
    }
}

#[derive(Parser)]
struct Args {
    /// JSON file holding app_id, mch_id, serial_no, key_path and friends.
    #[clap(long, env = "PAY_KERNEL_CONFIG")]
    config: PathBuf,
    #[clap(long, env = "PAY_KERNEL_SANDBOX")]
    sandbox: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one signed request and print the response.
    Request {
        endpoint: String,
        #[clap(long, default_value = "GET")]
        method: String,
        /// Query parameter as key=value; repeatable.
        #[clap(long = "query", value_parser = parse_pair)]
        query: Vec<(String, String)>,
        /// JSON object sent as the request body.
        #[clap(long)]
        body: Option<String>,
        /// Print the body as received instead of casting it.
        #[clap(long)]
        raw: bool,
        /// Skip the appid/mchid identity fields.
        #[clap(long)]
        plain: bool,
    },
    /// Download a file and verify it against the published digest.
    Download {
        url: String,
        #[clap(long)]
        out: PathBuf,
        #[clap(long, default_value = "")]
        hash: String,
        #[clap(long, value_enum, default_value = "sha256")]
        hash_type: HashType,
    },
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {s}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = Config::from_json_file(&args.config)?;
    config.sandbox |= args.sandbox;
    let client = BaseClient::from_config(config)?;

    match args.command {
        Command::Request {
            endpoint,
            method,
            query,
            body,
            raw,
            plain,
        } => {
            let method = Method::from_bytes(method.as_bytes())
                .with_context(|| format!("invalid HTTP method {method}"))?;
            let options = match body {
                Some(body) => {
                    let body: serde_json::Value =
                        serde_json::from_str(&body).context("parsing --body")?;
                    RequestOptions::from_body(&body)?
                }
                None => RequestOptions::new(),
            };
            let reply: Reply = if plain {
                if !query.is_empty() {
                    bail!("--query is not supported with --plain");
                }
                client.plain_request(&endpoint, method, options, raw).await?
            } else {
                let params: Query = query.into_iter().collect();
                client
                    .request(&endpoint, Some(&params), method, options, raw)
                    .await?
            };
            print_reply(reply)?;
        }
        Command::Download {
            url,
            out,
            hash,
            hash_type,
        } => {
            let descriptor = DownloadDescriptor::new(url).with_hash(hash_type.into(), hash);
            let written = client.stream_download(&descriptor, &out).await?;
            println!("{written} bytes written to {}", out.display());
        }
    }
    Ok(())
}

fn print_reply(reply: Reply) -> Result<()> {
    match reply {
        Reply::Raw(envelope) => {
            eprintln!("{}", envelope.status);
            println!("{}", String::from_utf8_lossy(&envelope.body));
        }
        Reply::Casted(Casted::GenericMap(map)) => {
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        Reply::Casted(Casted::RawBytes(bytes)) => {
            println!("{}", String::from_utf8_lossy(&bytes));
        }
        Reply::Casted(Casted::Typed(value)) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}
