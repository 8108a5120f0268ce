//! Telnet agent binary.
//!
//! Opens one line-oriented session to a remote host (directly or through a
//! SOCKS4 proxy), sends the configured login and command lines, forwards
//! stdin line by line and prints everything the remote side sends.

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, BufReader, Read};
use std::{path::PathBuf, time::Duration};
use telnet_session::{CancellationToken, SendOutcome, Session, SessionEvent};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[macro_use]
mod logging;
mod config;
mod display;

use config::{parse_host_port, AgentConfig, LoginConfig, ProxyConfig};
use logging::AgentLogFormatter;

/// Line-oriented telnet client with optional SOCKS4 proxy
#[derive(Parser, Debug)]
#[command(name = "telnet-agent", version, about = "Line-oriented telnet client with SOCKS4 support")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "telnet-agent.yaml")]
    config: PathBuf,

    /// Remote host name or IP
    #[arg(long)]
    host: Option<String>,

    /// Remote TCP port
    #[arg(long)]
    port: Option<u16>,

    /// Minimum spacing between sent lines, e.g. 3s or 500ms
    #[arg(long)]
    send_interval: Option<humantime::Duration>,

    /// SOCKS4 proxy as host:port
    #[arg(long)]
    proxy: Option<String>,

    /// Ident user id sent to the proxy
    #[arg(long)]
    proxy_user: Option<String>,

    /// User name sent as the first line after connecting
    #[arg(long)]
    login_user: Option<String>,

    /// Password sent after the user name
    #[arg(long, requires = "login_user")]
    login_password: Option<String>,

    /// Command line sent after login (repeatable)
    #[arg(long)]
    command: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Command line flags win over file and environment values
    fn apply_to(&self, config: &mut AgentConfig) -> anyhow::Result<()> {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(interval) = self.send_interval {
            let interval: Duration = interval.into();
            config.send_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        }

        if let Some(proxy) = &self.proxy {
            let (host, port) = parse_host_port(proxy)
                .with_context(|| format!("invalid --proxy value '{}', expected host:port", proxy))?;
            let user_id = config.proxy.take().map(|p| p.user_id).unwrap_or_default();
            config.proxy = Some(ProxyConfig {
                host,
                port,
                user_id,
            });
        }
        if let Some(user_id) = &self.proxy_user {
            match config.proxy.as_mut() {
                Some(proxy) => proxy.user_id = user_id.clone(),
                None => anyhow::bail!("--proxy-user given but no proxy is configured"),
            }
        }

        if let Some(user) = &self.login_user {
            config.login = Some(LoginConfig {
                user: user.clone(),
                password: self.login_password.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Lines sent before stdin forwarding starts
fn scripted_lines(config: &AgentConfig, commands: &[String]) -> Vec<String> {
    let mut lines = Vec::with_capacity(commands.len() + 2);
    if let Some(login) = &config.login {
        lines.push(login.user.clone());
        lines.push(login.password.clone());
    }
    lines.extend(commands.iter().cloned());
    lines
}

/// Send one line; `Ok(false)` means the session is going away
async fn send_line(session: &Session, line: &str) -> anyhow::Result<bool> {
    match session.send(line).await.context("failed to send line")? {
        SendOutcome::Delivered => Ok(true),
        outcome => {
            component_info!("agent", "Stopped sending: {:?}", outcome);
            Ok(false)
        }
    }
}

/// Read lines from `input` on a dedicated thread.
///
/// A blocked read on that thread never holds up runtime shutdown, so the
/// process can exit on Ctrl-C or remote close while stdin is still open.
fn spawn_line_reader<R>(input: R) -> io::Result<mpsc::Receiver<io::Result<String>>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in BufReader::new(input).lines() {
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Forward input lines until the input ends or `stop` fires
async fn forward_input(
    session: &Session,
    input: &mut mpsc::Receiver<io::Result<String>>,
    stop: &CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let line = tokio::select! {
            biased;
            _ = stop.cancelled() => return Ok(()),
            line = input.recv() => line,
        };

        match line {
            Some(Ok(line)) => {
                if !send_line(session, &line).await? {
                    return Ok(());
                }
            }
            Some(Err(e)) => {
                component_warn!("agent", "Failed to read stdin: {}", e);
                return Ok(());
            }
            None => {
                debug!("stdin closed");
                return Ok(());
            }
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("telnet_agent={}", args.log_level).parse()?)
        .add_directive(format!("telnet_session={}", args.log_level).parse()?)
        .add_directive(format!("telnet_wire={}", args.log_level).parse()?);

    let formatter = AgentLogFormatter::new("telnet-agent".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .event_format(formatter)
        .init();

    info!("Starting telnet agent v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AgentConfig::load_from_file(&args.config)?;
    args.apply_to(&mut config)?;

    let token = CancellationToken::new();

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGINT handler: {}", e))?;
    let signal_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM signal, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT signal, shutting down"),
            _ = signal_token.cancelled() => return,
        }
        signal_token.cancel();
    });

    let (session, mut events) = Session::with_channel(
        config.host.clone(),
        config.port,
        config.session_config(),
        &token,
    );

    // Fired by the printer once the session reports closure, or by a signal
    let closed = token.child_token();
    let printer_closed = closed.clone();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::MessageReceived { line } => {
                    println!("{}", display::sanitize(&line));
                }
                SessionEvent::ConnectionClosed => {
                    component_info!("agent", "Connection closed");
                    break;
                }
            }
        }
        printer_closed.cancel();
    });

    let connected = match &config.proxy {
        Some(proxy) => session
            .connect_via_proxy(&proxy.host, proxy.port, &proxy.user_id)
            .await
            .with_context(|| {
                format!(
                    "failed to connect to {}:{} via proxy {}:{}",
                    config.host, config.port, proxy.host, proxy.port
                )
            }),
        None => session
            .connect()
            .await
            .with_context(|| format!("failed to connect to {}:{}", config.host, config.port)),
    };
    if let Err(e) = connected {
        component_error!("agent", "{:#}", e);
        let _ = printer.await;
        return Err(e);
    }
    component_info!("agent", "Connected to {}:{}", config.host, config.port);

    let mut failure = None;
    let mut sending = true;

    for line in scripted_lines(&config, &args.command) {
        match send_line(&session, &line).await {
            Ok(true) => {}
            Ok(false) => {
                sending = false;
                break;
            }
            Err(e) => {
                failure = Some(e);
                sending = false;
                break;
            }
        }
    }

    if sending {
        let mut input = spawn_line_reader(io::stdin()).context("failed to start stdin reader")?;
        if let Err(e) = forward_input(&session, &mut input, &closed).await {
            failure = Some(e);
        }
    }

    session.disconnect().await;
    let _ = printer.await;

    let stats = session.stats();
    info!(
        "Telnet agent finished: {} lines sent, {} lines received",
        stats.lines_sent, stats.lines_received
    );

    match failure {
        Some(e) => {
            component_error!("agent", "{:#}", e);
            Err(e)
        }
        None => Ok(()),
    }
}
