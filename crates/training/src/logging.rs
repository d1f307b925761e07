use log::LevelFilter;

/// Initialize `env_logger` once, honouring `RUST_LOG` when set.
pub fn init_logging(default_filter: LevelFilter) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    if builder.try_init().is_err() {
        // Already initialized by an earlier caller.
    }
}
