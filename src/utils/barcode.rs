use chrono::Utc;

pub const DONATION_BARCODE_PREFIX: &str = "DON";
pub const SHARED_BARCODE_PREFIX: &str = "SHR";

/// Synthesizes a barcode such as `DON-58214907`: the prefix plus eight digits
/// derived from the unix-millisecond clock. `attempt` perturbs the digits so
/// the insert retry loop never reissues a code that just collided.
pub fn generate_barcode(prefix: &str, attempt: u32) -> String {
    let millis = Utc::now().timestamp_millis() as u64;
    let digits = millis.wrapping_add(u64::from(attempt) * 7_919) % 100_000_000;
    format!("{prefix}-{digits:08}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_shape(code: &str, prefix: &str) {
        let (head, tail) = code.split_once('-').expect("barcode has a dash");
        assert_eq!(head, prefix);
        assert_eq!(tail.len(), 8);
        assert!(tail.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn donation_barcode_shape() {
        assert_shape(&generate_barcode(DONATION_BARCODE_PREFIX, 0), "DON");
    }

    #[test]
    fn shared_barcode_shape() {
        assert_shape(&generate_barcode(SHARED_BARCODE_PREFIX, 2), "SHR");
    }

    #[test]
    fn retry_attempts_produce_distinct_codes() {
        let first = generate_barcode(DONATION_BARCODE_PREFIX, 0);
        let second = generate_barcode(DONATION_BARCODE_PREFIX, 1);
        assert_ne!(first, second);
    }
}
