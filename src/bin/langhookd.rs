//! LangHook service binary
//!
//! This is a thin wrapper that loads configuration and calls into the
//! `langhook-server` library's `run()` function.

fn main() -> anyhow::Result<()> {
    let config = langhook_core::config::Config::from_env()?;
    langhook_core::telemetry::init(&config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(langhook_server::run(config))
}
