use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

pub fn normalize_zone_name(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

/// Splits a comma separated zone list, dropping blanks and repeats.
pub fn parse_zone_list(raw: &str) -> Vec<String> {
    let mut zones: Vec<String> = Vec::new();
    for zone in raw.split(',').map(normalize_zone_name) {
        if !zone.is_empty() && !zones.contains(&zone) {
            zones.push(zone);
        }
    }
    zones
}

pub fn parse_instance_id(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|id| *id > 0)
}

pub fn normalize_save_every_ticks(value: u64) -> u64 {
    value.clamp(1, 72_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_list_is_trimmed_lowercased_and_deduplicated() {
        assert_eq!(
            parse_zone_list(" Shadowfang_Keep, ,black_temple,shadowfang_keep "),
            vec!["shadowfang_keep".to_string(), "black_temple".to_string()]
        );
        assert!(parse_zone_list("").is_empty());
    }

    #[test]
    fn instance_id_parsing_rejects_zero_and_garbage() {
        assert_eq!(parse_instance_id("12"), Some(12));
        assert_eq!(parse_instance_id(" 7 "), Some(7));
        assert_eq!(parse_instance_id("0"), None);
        assert_eq!(parse_instance_id("-1"), None);
        assert_eq!(parse_instance_id("abc"), None);
    }

    #[test]
    fn save_interval_is_clamped() {
        assert_eq!(normalize_save_every_ticks(0), 1);
        assert_eq!(normalize_save_every_ticks(200), 200);
        assert_eq!(normalize_save_every_ticks(u64::MAX), 72_000);
    }
}
