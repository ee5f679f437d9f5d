use tracing::{dispatcher::set_global_default, Dispatch};
use tracing_subscriber::FmtSubscriber;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "CHAOS_VERIFY_LOG";
/// Environment variable selecting the log format, `text` or `json`.
pub const LOG_FORMAT_ENV: &str = "CHAOS_VERIFY_LOG_FORMAT";

pub const DEFAULT_LEVELS: &str = "chaos_verify=info,k8s_test_framework=info,kube=warn";

/// Install the global subscriber.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init(color: bool, json: bool, levels: &str) {
    let dispatch = if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(levels)
            .json()
            .flatten_event(true)
            .finish();
        Dispatch::new(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_ansi(color)
            .with_env_filter(levels)
            .finish();
        Dispatch::new(subscriber)
    };

    // Tests can initialize this multiple times.
    let _ = set_global_default(dispatch);
}

/// Whether `format` names the JSON log format.
pub fn is_json(format: Option<&str>) -> bool {
    format.map_or(false, |format| format.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_format_is_opt_in() {
        assert!(is_json(Some("json")));
        assert!(is_json(Some("JSON")));
        assert!(!is_json(Some("text")));
        assert!(!is_json(None));
    }

    #[test]
    fn init_twice_is_harmless() {
        init(false, false, "error");
        init(false, true, "error");
        info!("still logging");
    }
}
