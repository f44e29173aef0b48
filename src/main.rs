//! X-Road SOAP message inspector.
//!
//! Run with: `xroad-soap inspect request.xml`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use xroad_soap::constants::{
    ELEM_FAULT, META_SERVICE_GET_SECURITY_SERVER_METRICS, META_SERVICE_LIST_CENTRAL_SERVICES,
    META_SERVICE_LIST_CLIENTS, META_SERVICE_LIST_METHODS,
};
use xroad_soap::header::deserialize_header;
use xroad_soap::response::read_fault;
use xroad_soap::{meta, AdapterConfig, Element, ErrorMessage, MessageHeader, SoapMessage};

/// Inspect X-Road SOAP messages and meta-service responses.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a SOAP message and print its header and body summary
    Inspect {
        /// SOAP message file
        file: PathBuf,
    },
    /// Decode a meta-service response
    Meta {
        #[arg(value_enum)]
        service: MetaService,

        /// Response file
        file: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MetaService {
    ListClients,
    ListCentralServices,
    ListMethods,
    Metrics,
}

#[derive(Serialize)]
struct Summary {
    header: MessageHeader,
    body: Vec<String>,
    fault: Option<ErrorMessage>,
    attachments: usize,
}

#[derive(Serialize)]
struct MetricsSummary {
    metric_sets: usize,
    xroad_version: BTreeMap<String, String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::WARN);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = if args.config.exists() {
        AdapterConfig::load(&args.config).context("Failed to load config file")?
    } else {
        info!("Config file not found, using defaults");
        AdapterConfig::default()
    };
    let mode = config.identifiers.mode;

    let output = match args.command {
        Command::Inspect { file } => {
            let message = read_message(&file)?;
            serde_yaml::to_string(&summarize(&message, &config)?)?
        }
        Command::Meta { service, file } => match service {
            MetaService::ListClients => {
                let clients = meta::decode_list_clients(&read(&file)?, mode)
                    .with_context(|| decode_failed(META_SERVICE_LIST_CLIENTS))?;
                serde_yaml::to_string(&clients)?
            }
            MetaService::ListCentralServices => {
                let services = meta::decode_list_central_services(&read(&file)?, mode)
                    .with_context(|| decode_failed(META_SERVICE_LIST_CENTRAL_SERVICES))?;
                serde_yaml::to_string(&services)?
            }
            MetaService::ListMethods => {
                let response = meta::list_methods_deserializer(mode)
                    .deserialize(&read_message(&file)?, response_namespace(META_SERVICE_LIST_METHODS), false)
                    .with_context(|| decode_failed(META_SERVICE_LIST_METHODS))?;
                match response.error_message {
                    Some(fault) => serde_yaml::to_string(&fault)?,
                    None => serde_yaml::to_string(&response.response_data.unwrap_or_default())?,
                }
            }
            MetaService::Metrics => {
                let response = meta::security_server_metrics_deserializer()
                    .with_identifier_mode(mode)
                    .deserialize(
                        &read_message(&file)?,
                        response_namespace(META_SERVICE_GET_SECURITY_SERVER_METRICS),
                        false,
                    )
                    .with_context(|| decode_failed(META_SERVICE_GET_SECURITY_SERVER_METRICS))?;
                match response.error_message {
                    Some(fault) => serde_yaml::to_string(&fault)?,
                    None => {
                        let sets = response.response_data.unwrap_or_default();
                        serde_yaml::to_string(&MetricsSummary {
                            metric_sets: sets.len(),
                            xroad_version: meta::xroad_version_info(&sets),
                        })?
                    }
                }
            }
        },
    };

    print!("{}", output);
    Ok(())
}

fn decode_failed(service: &str) -> String {
    format!("Failed to decode {} response", service)
}

fn response_namespace(service: &str) -> &'static str {
    meta::service_namespace(service).0
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_message(path: &Path) -> Result<SoapMessage> {
    SoapMessage::parse(&read(path)?).with_context(|| format!("Failed to parse {}", path.display()))
}

fn summarize(message: &SoapMessage, config: &AdapterConfig) -> Result<Summary> {
    let header = deserialize_header(message.header(), config.identifiers.mode)
        .context("Failed to read X-Road header")?;

    let fault = message
        .body()
        .child(ELEM_FAULT)
        .map(|fault| read_fault(fault, |node| node.map(Element::text_content)));

    Ok(Summary {
        header,
        body: message
            .body()
            .child_elements()
            .map(|element| match &element.namespace {
                Some(namespace) => format!("{{{}}}{}", namespace, element.name),
                None => element.name.clone(),
            })
            .collect(),
        fault,
        attachments: message.attachments().len(),
    })
}
