use crate::error::AppError;
use crate::notify::{Notifier, Permission};
use notify_rust::Notification;

pub struct LinuxNotifier;

impl Notifier for LinuxNotifier {
    // The desktop notification daemon has no permission model.
    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn show(&self, title: &str, body: &str) -> Result<(), AppError> {
        Notification::new()
            .appname("cronboard")
            .summary(title)
            .body(body)
            .show()
            .map_err(|err| AppError::notification(err.to_string()))?;
        Ok(())
    }
}
