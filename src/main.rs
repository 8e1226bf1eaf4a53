//! Unified XSETTINGS binary: the manager daemon plus small client tools
//! for inspecting and driving a running manager.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x11rb::connection::Connection;
use x11rb::rust_connection::RustConnection;

use xsettings::config::Config;
use xsettings::{Client, Color, Manager, SettingAction, SettingValue, SettingsCallback};

const USAGE: &str = "usage: xsettings <command>

commands:
  daemon [--config PATH]   own the screen's selection and publish settings
  monitor                  print setting changes as they happen
  dump                     print the current settings once
  set NAME int VALUE       push one setting through the running manager
  set NAME str VALUE
  set NAME color R G B A";

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "xsettings=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("daemon") => run_daemon(&args[2..]),
        Some("monitor") => run_monitor(),
        Some("dump") => run_dump(),
        Some("set") => run_set(&args[2..]),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn connect() -> Result<(Arc<RustConnection>, usize)> {
    let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
    info!("Connected to X server, screen {}", screen_num);
    Ok((Arc::new(conn), screen_num))
}

fn run_daemon(args: &[String]) -> Result<()> {
    let mut config_path: Option<PathBuf> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().context("--config requires a path")?;
                config_path = Some(PathBuf::from(path));
            }
            other => bail!("unknown daemon option '{}'\n{}", other, USAGE),
        }
    }

    let config = Config::load(config_path.as_deref())?;

    let (conn, screen_num) = connect()?;
    let mut manager =
        Manager::new(conn.clone(), screen_num).context("Failed to become the settings manager")?;

    for (name, value) in &config.settings {
        manager.set(name, value);
    }
    manager.notify()?;
    info!("serving {} settings", manager.settings().len());

    loop {
        let event = conn.wait_for_event()?;
        if manager.should_terminate(&event) {
            info!("replaced by another settings manager, exiting");
            return Ok(());
        }
    }
}

fn run_monitor() -> Result<()> {
    let (conn, screen_num) = connect()?;

    let callback: SettingsCallback = Box::new(|name, action, setting| match (action, setting) {
        (SettingAction::Deleted, _) => println!("deleted  {}", name),
        (SettingAction::New, Some(s)) => println!("new      {} = {}", name, s.value),
        (SettingAction::Changed, Some(s)) => println!("changed  {} = {}", name, s.value),
        _ => {}
    });

    let mut client = Client::new(conn.clone(), screen_num, callback)?;
    if !client.has_manager() {
        info!("no manager yet, waiting for one to appear");
    }

    loop {
        let event = conn.wait_for_event()?;
        client.process_event(&event)?;
    }
}

fn run_dump() -> Result<()> {
    let (conn, screen_num) = connect()?;

    let client = Client::new(conn, screen_num, Box::new(|_, _, _| {}))?;
    if !client.has_manager() {
        bail!("no settings manager is running on this screen");
    }

    for setting in client.settings() {
        println!("{} = {}", setting.name, setting.value);
    }
    Ok(())
}

fn run_set(args: &[String]) -> Result<()> {
    let (name, kind, rest) = match args {
        [name, kind, rest @ ..] => (name, kind.as_str(), rest),
        _ => bail!("set needs a name, a type and a value\n{}", USAGE),
    };

    let value = match (kind, rest) {
        ("int", [v]) => SettingValue::Int(v.parse().context("value is not an integer")?),
        ("str", [v]) => SettingValue::Text(v.clone()),
        ("color", [r, g, b, a]) => SettingValue::Color(Color::new(
            r.parse().context("red is not a 16-bit value")?,
            g.parse().context("green is not a 16-bit value")?,
            b.parse().context("blue is not a 16-bit value")?,
            a.parse().context("alpha is not a 16-bit value")?,
        )),
        _ => bail!("malformed set command\n{}", USAGE),
    };

    let (conn, screen_num) = connect()?;
    let mut client = Client::new(conn, screen_num, Box::new(|_, _, _| {}))?;
    if !client.has_manager() {
        bail!("no settings manager is running on this screen");
    }

    client.set(name, value);
    client.manager_notify()?;
    info!("pushed '{}' to the manager", name);
    Ok(())
}
