/// Selection Fee Model
///
/// Fee is a step function of the number of selected inputs, approximating the
/// size-based fee of a standard transaction with one payment and one change
/// output:
///
/// ```text
/// bytes = inputs * 148 + 2 * 34 + 10 + 9
/// raw   = bytes * 100_000 / 1024            (truncated)
/// fee   = round_half_up(raw / 100_000) * 100_000
/// fee   = max(fee, 100_000)
/// ```
///
/// Everything is integer arithmetic, so there is no floating-point drift at
/// the rounding boundary.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Serialized size of one signed P2PKH input
    pub input_bytes: u64,
    /// Serialized size of one P2PKH output
    pub output_bytes: u64,
    /// Outputs assumed per transaction (payment + change)
    pub outputs: u64,
    /// Version, locktime and count fields
    pub overhead_bytes: u64,
    /// Fee charged per `kilobyte` bytes
    pub fee_per_kb: i64,
    pub kilobyte: u64,
    /// Fees are rounded to a multiple of this
    pub fee_unit: i64,
    pub min_fee: i64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            input_bytes: 148,
            output_bytes: 34,
            outputs: 2,
            overhead_bytes: 10 + 9,
            fee_per_kb: 100_000,
            kilobyte: 1024,
            fee_unit: 100_000,
            min_fee: 100_000,
        }
    }
}

impl FeeSchedule {
    /// Estimated transaction size for `inputs` inputs
    pub fn tx_bytes(&self, inputs: usize) -> u64 {
        (inputs as u64) * self.input_bytes + self.outputs * self.output_bytes + self.overhead_bytes
    }

    /// Fee for a transaction spending `inputs` inputs
    pub fn fee_for_inputs(&self, inputs: usize) -> i64 {
        let raw = (self.tx_bytes(inputs) as i128 * self.fee_per_kb as i128) / self.kilobyte.max(1) as i128;
        let unit = self.fee_unit.max(1) as i128;
        let rounded = ((raw + unit / 2) / unit) * unit;
        let fee = i64::try_from(rounded).unwrap_or(i64::MAX);
        fee.max(self.min_fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_fee_for_small_transactions() {
        let schedule = FeeSchedule::default();
        for inputs in 0..=6 {
            assert_eq!(schedule.fee_for_inputs(inputs), 100_000, "inputs = {}", inputs);
        }
    }

    #[test]
    fn test_rounding_steps() {
        let schedule = FeeSchedule::default();
        // 7 inputs: 1123 bytes -> 109_667 raw -> rounds down to 100_000
        assert_eq!(schedule.fee_for_inputs(7), 100_000);
        // 10 inputs: 1567 bytes -> 153_027 raw -> rounds up to 200_000
        assert_eq!(schedule.fee_for_inputs(10), 200_000);
        // 100 inputs: 14_887 bytes -> 1_453_808 raw -> 1_500_000
        assert_eq!(schedule.fee_for_inputs(100), 1_500_000);
    }

    #[test]
    fn test_half_unit_rounds_up() {
        // raw exactly 150_000: bytes * 100_000 / 1024 == 150_000 when bytes == 1536
        let schedule = FeeSchedule {
            input_bytes: 1536,
            output_bytes: 0,
            outputs: 0,
            overhead_bytes: 0,
            ..FeeSchedule::default()
        };
        assert_eq!(schedule.fee_for_inputs(1), 200_000);
    }

    #[test]
    fn test_fee_is_monotonic() {
        let schedule = FeeSchedule::default();
        let mut previous = 0;
        for inputs in 0..5_000 {
            let fee = schedule.fee_for_inputs(inputs);
            assert!(fee >= previous, "fee dropped at {} inputs", inputs);
            previous = fee;
        }
    }
}
