/// Rounds `value` to `decimals` places, halves away from zero.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::round_to;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_to(2.25, 1), 2.3);
        assert_eq!(round_to(-2.25, 1), -2.3);
        assert_eq!(round_to(0.0005, 3), 0.001);
        assert_eq!(round_to(1234.5678, 2), 1234.57);
    }

    #[test]
    fn zero_places_rounds_to_integer() {
        assert_eq!(round_to(7.5, 0), 8.0);
        assert_eq!(round_to(-7.5, 0), -8.0);
    }
}
