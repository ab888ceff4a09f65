pub mod classify;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fetch;
pub mod handle;
pub mod model;
pub mod notify;
pub mod occurrence;
pub mod poller;

#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::model::TaskRecord;

    #[test]
    fn task_record_has_required_fields() {
        let record = TaskRecord::new("0", "Repot Sunny the Succulent", "0 7 14 3 *");

        assert_eq!(record.id, "0");
        assert_eq!(record.name, "Repot Sunny the Succulent");
        assert_eq!(record.cron_expression, "0 7 14 3 *");
    }

    #[test]
    fn app_error_exposes_code() {
        let err = AppError::invalid_input("missing cron expression");
        assert_eq!(err.code(), "invalid_input");
        assert_eq!(err.to_string(), "invalid_input - missing cron expression");
    }

    #[test]
    fn per_record_errors_are_distinguished() {
        assert!(AppError::cron_parse("x", "bad").is_per_record());
        assert!(AppError::no_occurrence("0 0 30 2 *").is_per_record());
        assert!(!AppError::fetch("timeout").is_per_record());
    }
}
