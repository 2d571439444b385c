use anyhow::{Context, Result as AnyhowResult};
use clap::{Parser, Subcommand};
use crossterm::event::{poll as event_poll, read as event_read, Event as CrosstermEvent};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use lite_ide::config::Config;
use lite_ide::file_tree::{FileExplorer, TreeWatchDriver};
use lite_ide::model::FileNode;
use lite_ide::services::http::HttpFileApi;
use lite_ide::services::terminal::keys::key_event_bytes;
use lite_ide::services::terminal::{
    TerminalHost, TerminalId, TerminalMultiplexer, TerminalSize, WsTerminalConnector,
};
use lite_ide::services::time_source::RealTimeSource;
use lite_ide::services::watch::HttpWatchConnector;
use lite_ide::services::{log_dirs, tracing_setup};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Client for a lite-ide server: live file tree and remote terminals
#[derive(Parser, Debug)]
#[command(name = "lite-ide-client")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<String>,

    /// Path to log file (default: XDG state directory)
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Override the API endpoint from the config
    #[arg(long, value_name = "URL", global = true)]
    api: Option<String>,

    /// Override the WebSocket host from the config
    #[arg(long, value_name = "URL", global = true)]
    ws: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch a server directory and print the tree on every change
    Tree {
        /// Server-side directory to watch
        #[arg(long)]
        root: String,

        /// Folder to expand once the first snapshot arrived (repeatable)
        #[arg(long, value_name = "PATH")]
        expand: Vec<String>,

        /// Exit after the first snapshot and the requested expansions
        #[arg(long)]
        once: bool,
    },
    /// Attach this terminal to remote shells.
    ///
    /// Alt+T opens a tab, Alt+W closes the active one, Alt+1..9 switches,
    /// Ctrl+] detaches.
    Term,
    /// Print the JSON Schema of the config file
    Schema,
    /// Print the effective configuration as JSON
    DumpConfig,
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();

    let log_file = args.log_file.clone().unwrap_or_else(log_dirs::main_log_path);
    if !tracing_setup::init_global(&log_file) {
        eprintln!("Warning: could not open log file {}", log_file.display());
    }
    log_dirs::cleanup_stale_logs();
    tracing::info!("lite-ide-client starting");

    let mut config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(api) = &args.api {
        config.api_endpoint = api.clone();
    }
    if let Some(ws) = &args.ws {
        config.ws_host = ws.clone();
    }

    match args.command {
        Command::Tree { root, expand, once } => run_tree(&config, &root, &expand, once),
        Command::Term => run_term(&config),
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&Config::json_schema())?);
            Ok(())
        }
        Command::DumpConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn run_tree(config: &Config, root: &str, expand: &[String], once: bool) -> AnyhowResult<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let api = HttpFileApi::new(&config.api_endpoint).context("Invalid API endpoint")?;
    let connector =
        HttpWatchConnector::new(&config.api_endpoint).context("Invalid API endpoint")?;

    let explorer = FileExplorer::new(
        config.file_explorer.page_limit,
        config.tree_reconnect_delay(),
    );
    let mut driver = TreeWatchDriver::new(explorer, Arc::new(connector), RealTimeSource::shared());
    driver.open_root(root);

    let mut expanded = false;
    loop {
        if !driver.pump(Duration::from_millis(250)) {
            continue;
        }
        if !expanded {
            expanded = true;
            for path in expand {
                if let Err(e) = runtime.block_on(driver.expand(&api, path)) {
                    eprintln!("{}", e);
                }
            }
        }
        print_tree(driver.explorer().tree())?;
        if once {
            return Ok(());
        }
    }
}

fn print_tree(tree: &[FileNode]) -> io::Result<()> {
    fn walk(out: &mut impl Write, nodes: &[FileNode], depth: usize) -> io::Result<()> {
        for node in nodes {
            let marker = if node.is_folder() { "/" } else { "" };
            let more = if node.has_more { " (more)" } else { "" };
            writeln!(out, "{:indent$}{}{}{}", "", node.name, marker, more, indent = depth * 2)?;
            walk(out, node.children(), depth + 1)?;
        }
        Ok(())
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "---")?;
    walk(&mut out, tree, 0)?;
    out.flush()
}

/// Raw mode for the lifetime of the guard.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

enum TermAction {
    Keys(Vec<u8>),
    NewTab,
    CloseTab,
    Switch(usize),
    Detach,
    None,
}

fn classify_key(key: &KeyEvent) -> TermAction {
    if key.kind == KeyEventKind::Release {
        return TermAction::None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char(']') {
        return TermAction::Detach;
    }
    if key.modifiers == KeyModifiers::ALT {
        match key.code {
            KeyCode::Char('t') => return TermAction::NewTab,
            KeyCode::Char('w') => return TermAction::CloseTab,
            KeyCode::Char(c @ '1'..='9') => return TermAction::Switch(c as usize - '1' as usize),
            _ => {}
        }
    }
    match key_event_bytes(key) {
        Some(bytes) => TermAction::Keys(bytes),
        None => TermAction::None,
    }
}

fn run_term(config: &Config) -> AnyhowResult<()> {
    let connector = WsTerminalConnector::new(&config.ws_host).context("Invalid WebSocket host")?;
    let time = RealTimeSource::shared();

    let mut options = config.session_options();
    if let Ok((cols, rows)) = crossterm::terminal::size() {
        options.initial_size = TerminalSize::new(cols, rows);
    }
    let (mux, initial) = TerminalMultiplexer::new(options, config.focus_policy(), time.now());
    let mut host = TerminalHost::new(mux, initial, Arc::new(connector), time);
    let mut backlog: HashMap<TerminalId, String> = HashMap::new();

    let _raw = RawModeGuard::enable().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let active = host.multiplexer().active();
    host.set_mounted(active, true);

    loop {
        host.pump(Duration::from_millis(5));

        let active = host.multiplexer().active();
        for (terminal, text) in host.take_output() {
            if terminal == active {
                stdout.write_all(text.as_bytes())?;
            } else {
                append_capped(backlog.entry(terminal).or_default(), &text);
            }
        }
        stdout.flush()?;

        if !event_poll(Duration::from_millis(10))? {
            continue;
        }
        match event_read()? {
            CrosstermEvent::Key(key) => match classify_key(&key) {
                TermAction::Keys(bytes) => host.send_keys(bytes),
                TermAction::Detach => break,
                TermAction::NewTab => {
                    let id = host.new_tab();
                    host.set_mounted(id, true);
                }
                TermAction::CloseTab => {
                    if let Err(e) = host.close_tab(host.multiplexer().active()) {
                        tracing::info!("{}", e);
                    }
                    show_active(&mut host, &mut backlog, &mut stdout)?;
                }
                TermAction::Switch(index) => {
                    let target = host.multiplexer().tabs().get(index).map(|t| t.id);
                    if let Some(id) = target {
                        if host.activate(id).is_ok() {
                            show_active(&mut host, &mut backlog, &mut stdout)?;
                        }
                    }
                }
                TermAction::None => {}
            },
            CrosstermEvent::Resize(cols, rows) => host.resize(TerminalSize::new(cols, rows)),
            _ => {}
        }
    }

    host.shutdown();
    Ok(())
}

/// Output kept per background tab, in bytes.
const BACKLOG_LIMIT: usize = 64 * 1024;

/// Append `text`, keeping only the last [`BACKLOG_LIMIT`] bytes.
fn append_capped(backlog: &mut String, text: &str) {
    backlog.push_str(text);
    if backlog.len() > BACKLOG_LIMIT {
        let mut cut = backlog.len() - BACKLOG_LIMIT;
        while !backlog.is_char_boundary(cut) {
            cut += 1;
        }
        backlog.drain(..cut);
    }
}

/// Replay output the newly active tab produced while in the background.
fn show_active(
    host: &mut TerminalHost,
    backlog: &mut HashMap<TerminalId, String>,
    stdout: &mut io::Stdout,
) -> io::Result<()> {
    let active = host.multiplexer().active();
    host.set_mounted(active, true);
    if let Some(text) = backlog.remove(&active) {
        stdout.write_all(text.as_bytes())?;
    }
    stdout.flush()
}
