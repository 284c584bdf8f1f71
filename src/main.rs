#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
#![cfg_attr(not(target_os = "windows"), allow(dead_code))]

mod icon;
mod logging;
mod menu;
mod session;
#[cfg(target_os = "windows")]
mod windows;

#[allow(unreachable_code)]
fn run() -> anyhow::Result<()> {
    #[cfg(target_os = "windows")]
    windows::run()?;

    #[cfg(not(target_os = "windows"))]
    anyhow::bail!("tray-session requires the Windows shell notification area");

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let log_guard = logging::init()?;

    tracing::debug!("Initialized Logger");

    std::panic::set_hook(Box::new(|info| {
        tracing::error!("{info}");
    }));

    if let Err(e) = run() {
        tracing::error!("{e:#}");
        // exit skips destructors; flush the file log first
        drop(log_guard);
        std::process::exit(1);
    }

    Ok(())
}
