//! Board discovery from the batch environment
//!
//! The cluster scheduler exports the USB serial numbers of the boards
//! allocated to a job as a comma-separated list.

use tracing::debug;

/// Scheduler-provided list of allocated boards.
pub const SLURM_BOARDS_VAR: &str = "SLURM_FLYSPI_ID";

/// Board selected explicitly by the user.
pub const BOARD_VAR: &str = "FLYSPI_ID";

/// USB serial numbers of the boards allocated to this job.
///
/// Empty if the scheduler did not allocate any.
pub fn available_board_usb_serial_numbers() -> Vec<String> {
    match std::env::var(SLURM_BOARDS_VAR) {
        Ok(list) => {
            let serials = parse_serial_list(&list);
            debug!(count = serials.len(), "boards from {SLURM_BOARDS_VAR}");
            serials
        }
        Err(_) => Vec::new(),
    }
}

/// Board named by `FLYSPI_ID`, falling back to the first allocated board.
pub fn default_board_usb_serial_number() -> Option<String> {
    std::env::var(BOARD_VAR)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| available_board_usb_serial_numbers().into_iter().next())
}

/// Split a comma-separated serial list, dropping blanks.
pub fn parse_serial_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_serials() {
        assert_eq!(parse_serial_list("07, 12,,A3 "), vec!["07", "12", "A3"]);
        assert!(parse_serial_list("").is_empty());
    }
}
