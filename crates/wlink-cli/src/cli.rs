//! CLI command definitions and argument parsing

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};
use wlink_core::codec::{self, CodecError};
use wlink_core::message::{
    EncryptedRequest, RequestAction, ResponseContent, RpcRequestMessage,
};
use wlink_core::sqlite_store::SqliteStorage;
use wlink_core::{ChannelError, SecureChannelManager};
use wlink_crypto::PublicKey;

use crate::config::Config;
use crate::output::{
    ChannelInfo, DecodedReturn, OutputFormat, OutputFormatter, RequestUrl, SuccessMessage,
};
use crate::ExitCode;

/// wlink - inspect and drive a dapp-to-wallet channel
#[derive(Parser, Debug)]
#[command(name = "wlink")]
#[command(version, about = "wlink - secure dapp-to-wallet channel tool")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (overrides config)
    #[arg(long, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug mode (message-level tracing)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Wallet name scoping the channel (overrides config)
    #[arg(long, global = true)]
    pub wallet: Option<String>,
}

impl Cli {
    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let format = config.output.format.parse().unwrap_or_default();
        let formatter = OutputFormatter::new(format, config.output.verbose);

        match self.command {
            Commands::Channel(args) => args.execute(&config, &formatter).await,
            Commands::Request(args) => args.execute(&config, &formatter).await,
            Commands::Response(args) => args.execute(&config, &formatter).await,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect or modify the persisted channel
    Channel(ChannelArgs),
    /// Build outbound request URLs
    Request(RequestArgs),
    /// Decode return deep links
    Response(ResponseArgs),
}

/// Open the channel for the configured wallet, creating the database if needed.
fn open_channel(config: &Config) -> anyhow::Result<SecureChannelManager<SqliteStorage>> {
    let db_path = config
        .db_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine channel database path"))?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    debug!(path = %db_path.display(), wallet = %config.wallet.name, "opening channel store");
    let storage = SqliteStorage::open(&db_path)?;
    Ok(SecureChannelManager::new(storage, &config.wallet.name))
}

/// Report a failure in the selected format and hand back its exit code.
fn fail(formatter: &OutputFormatter, message: &str, code: ExitCode) -> ExitCode {
    let rendered = formatter.format_error_with_code(message, code);
    match formatter.format() {
        OutputFormat::Json => println!("{rendered}"),
        OutputFormat::Table => eprintln!("{rendered}"),
        OutputFormat::Quiet => {}
    }
    code
}

fn print(rendered: String) {
    if !rendered.is_empty() {
        println!("{rendered}");
    }
}

// ============================================================================
// channel
// ============================================================================

/// Arguments for the channel command
#[derive(Parser, Debug)]
pub struct ChannelArgs {
    #[command(subcommand)]
    pub action: ChannelAction,
}

#[derive(Subcommand, Debug)]
pub enum ChannelAction {
    /// Show own public key, peer key and secret availability
    Show,
    /// Store the wallet's public key
    SetPeer {
        /// Peer public key (64 hex characters)
        key: String,
    },
    /// Forget every key of the channel
    Reset {
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
}

impl ChannelArgs {
    pub async fn execute(self, config: &Config, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let mut channel = open_channel(config)?;

        match self.action {
            ChannelAction::Show => {
                formatter.progress("Loading channel keys...");
                let info = channel_info(config, &mut channel).await?;
                print(formatter.format_channel(&info));
                Ok(ExitCode::Success)
            }
            ChannelAction::SetPeer { key } => {
                let peer = match PublicKey::from_hex(key.trim()) {
                    Ok(peer) => peer,
                    Err(e) => {
                        return Ok(fail(formatter, &format!("Invalid peer key: {e}"), ExitCode::InvalidInput))
                    }
                };
                match channel.set_peer_public_key(peer).await {
                    Ok(()) => {}
                    Err(ChannelError::KeyDerivation(e)) => {
                        return Ok(fail(formatter, &format!("Unusable peer key: {e}"), ExitCode::InvalidInput))
                    }
                    Err(e) => return Err(e.into()),
                }
                info!(peer = %peer.fingerprint(), "peer key stored");

                formatter.success(&format!("Peer key stored for wallet '{}'", config.wallet.name));
                print(formatter.format_success(
                    &SuccessMessage::new(format!("peer key {} stored", peer.fingerprint())),
                    "channel set-peer",
                ));
                Ok(ExitCode::Success)
            }
            ChannelAction::Reset { force } => {
                if !force {
                    let warning = format!(
                        "WARNING: This will delete the channel keys for wallet '{}'.\n\
                         The next connection will need a fresh handshake.",
                        config.wallet.name
                    );
                    if !confirm(&warning, &mut io::stdin().lock(), &mut io::stderr())? {
                        eprintln!("Aborted.");
                        return Ok(ExitCode::Success);
                    }
                }

                channel.clear().await?;
                formatter.success(&format!("Channel reset for wallet '{}'", config.wallet.name));
                print(formatter.format_success(&SuccessMessage::new("channel reset"), "channel reset"));
                Ok(ExitCode::Success)
            }
        }
    }
}

/// Print `warning` and a y/N prompt to `out`, then read the answer from `input`.
fn confirm(warning: &str, input: &mut impl BufRead, out: &mut impl Write) -> io::Result<bool> {
    writeln!(out, "{warning}")?;
    write!(out, "Are you sure you want to continue? [y/N] ")?;
    out.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

async fn channel_info(
    config: &Config,
    channel: &mut SecureChannelManager<SqliteStorage>,
) -> anyhow::Result<ChannelInfo> {
    let own = channel.get_own_public_key().await?;
    let peer = channel.peer_public_key().await?;
    let secret = channel.get_shared_secret().await?;
    Ok(ChannelInfo {
        wallet: config.wallet.name.clone(),
        own_public_key: own.to_hex(),
        peer_public_key: peer.map(|k| k.to_hex()),
        secret_derivable: secret.is_some(),
    })
}

// ============================================================================
// request
// ============================================================================

/// Arguments for the request command
#[derive(Parser, Debug)]
pub struct RequestArgs {
    #[command(subcommand)]
    pub action: RequestCommand,
}

#[derive(Subcommand, Debug)]
pub enum RequestCommand {
    /// Print the wallet URL of a handshake request
    Handshake,
    /// Print the wallet URL of a sealed RPC request
    Sealed {
        /// RPC method name
        method: String,
        /// JSON params
        #[arg(long, default_value = "[]")]
        params: String,
        /// Chain the request targets (defaults to the first configured chain)
        #[arg(long)]
        chain_id: Option<u64>,
    },
}

impl RequestArgs {
    pub async fn execute(self, config: &Config, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let wallet = config.wallet_descriptor()?;
        let mut channel = open_channel(config)?;
        let own = channel.get_own_public_key().await?;

        let (request, method, command) = match self.action {
            RequestCommand::Handshake => {
                let metadata = config.app_metadata();
                let request = RpcRequestMessage::handshake(
                    &own,
                    &metadata.callback_url,
                    "eth_requestAccounts",
                    metadata.handshake_params(),
                );
                (request, "eth_requestAccounts".to_string(), "request handshake")
            }
            RequestCommand::Sealed { method, params, chain_id } => {
                let params: Value = match serde_json::from_str(&params) {
                    Ok(params) => params,
                    Err(e) => {
                        return Ok(fail(formatter, &format!("Invalid params JSON: {e}"), ExitCode::InvalidInput))
                    }
                };
                let Some(secret) = channel.get_shared_secret().await? else {
                    return Ok(fail(
                        formatter,
                        "No peer key stored; run a handshake or `channel set-peer` first",
                        ExitCode::NotConnected,
                    ));
                };
                let chain_id = chain_id
                    .or_else(|| config.app.chain_ids.first().copied())
                    .unwrap_or(1);
                let payload = EncryptedRequest {
                    action: RequestAction {
                        method: method.clone(),
                        params,
                    },
                    chain_id,
                };
                let sealed = codec::encrypt_content(&secret, &payload)?;
                let request = RpcRequestMessage::encrypted(&own, &config.app.callback_url, &sealed);
                (request, method, "request sealed")
            }
        };

        let url = codec::build_request_url(&wallet.url, &request)?;
        info!(request_id = %request.id, method = %method, "request url built");
        print(formatter.format_request(
            &RequestUrl {
                request_id: request.id.to_string(),
                method,
                url: url.to_string(),
            },
            command,
        ));
        Ok(ExitCode::Success)
    }
}

// ============================================================================
// response
// ============================================================================

/// Arguments for the response command
#[derive(Parser, Debug)]
pub struct ResponseArgs {
    #[command(subcommand)]
    pub action: ResponseAction,
}

#[derive(Subcommand, Debug)]
pub enum ResponseAction {
    /// Decode a return deep link, decrypting it when the channel can
    Decode {
        /// The full return URL
        url: String,
        /// Store the sender as the peer key first (handshake responses)
        #[arg(long)]
        adopt_sender: bool,
    },
}

impl ResponseArgs {
    pub async fn execute(self, config: &Config, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let ResponseAction::Decode { url, adopt_sender } = self.action;

        let response = match codec::response_from_url(&url) {
            Ok(response) => response,
            Err(e) => return Ok(fail(formatter, &format!("Malformed return URL: {e}"), ExitCode::InvalidInput)),
        };

        let mut decoded = DecodedReturn {
            id: response.id.to_string(),
            request_id: response.request_id.to_string(),
            sender: response.sender.clone(),
            timestamp: response.timestamp.to_rfc3339(),
            content: String::new(),
            payload: None,
            error: None,
        };

        match &response.content {
            ResponseContent::Failure(error) => {
                decoded.content = "failure".into();
                decoded.error = Some(serde_json::to_value(error)?);
            }
            ResponseContent::Encrypted(content) => {
                decoded.content = "encrypted".into();
                let mut channel = open_channel(config)?;

                if adopt_sender {
                    let peer = match PublicKey::from_hex(&response.sender) {
                        Ok(peer) => peer,
                        Err(e) => {
                            return Ok(fail(formatter, &format!("Invalid sender key: {e}"), ExitCode::InvalidInput))
                        }
                    };
                    channel.set_peer_public_key(peer).await?;
                }

                match channel.get_shared_secret().await? {
                    Some(secret) => match codec::decrypt_content::<Value>(&secret, content) {
                        Ok(payload) => decoded.payload = Some(payload),
                        Err(e @ (CodecError::Crypto(_) | CodecError::InvalidParameter { .. })) => {
                            return Ok(fail(
                                formatter,
                                &format!("Could not open response: {e}"),
                                ExitCode::InvalidInput,
                            ))
                        }
                        Err(e) => return Err(e.into()),
                    },
                    None => formatter.warning("No shared secret; content left sealed"),
                }
            }
        }

        print(formatter.format_return(&decoded));
        Ok(ExitCode::Success)
    }
}
