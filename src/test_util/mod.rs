use std::io::IsTerminal;

pub mod mock;

pub fn trace_init() {
    let color = std::io::stdout().is_terminal();
    let levels = std::env::var("TEST_LOG").unwrap_or_else(|_| "error".to_string());

    crate::trace::init(color, false, &levels);
}
