use crate::error::AppError;
use crate::notify::Notifier;
use notify_rust::{Notification, Timeout};

pub struct LinuxNotifier;

impl Notifier for LinuxNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<(), AppError> {
        Notification::new()
            .appname("tickler")
            .summary(title)
            .body(body)
            .timeout(Timeout::Default)
            .show()
            .map_err(|err| AppError::io(err.to_string()))?;
        Ok(())
    }
}
