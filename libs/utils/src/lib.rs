use std::env;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("pretty") {
            LogFormat::Pretty
        } else {
            LogFormat::Compact
        }
    }
}

/// Directives for our own crates at `level`, quieter defaults for the
/// database and http stacks.
pub fn default_directives(crates: &[&str], level: &str) -> String {
    let mut directives: Vec<String> = crates.iter().map(|c| format!("{c}={level}")).collect();
    directives.push("sqlx=warn".to_string());
    directives.push("sea_orm=warn".to_string());
    directives.push("hyper=warn".to_string());
    directives.join(",")
}

/// `RUST_LOG` wins over `env_filter` when set.
pub fn set_log(env_filter: String, format: LogFormat) {
    let filter = match env::var("RUST_LOG") {
        Ok(v) if !v.is_empty() => EnvFilter::new(v),
        _ => EnvFilter::new(env_filter),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true);
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        let d = default_directives(&["dvrman", "api"], "debug");
        assert!(d.starts_with("dvrman=debug,api=debug"));
        assert!(d.contains("sqlx=warn"));
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Compact);
    }
}
