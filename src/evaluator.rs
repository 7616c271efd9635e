use crate::models::{Check, Outcome, Status};

/// Up iff there is no error and the response code is an accepted one.
pub fn derive_state(check: &Check, outcome: &Outcome) -> Status {
    match (outcome.error.as_ref(), outcome.response_code) {
        (None, Some(code)) if check.success_codes.contains(&code) => Status::Up,
        _ => Status::Down,
    }
}

/// A first evaluation never alerts; afterwards any state change does.
pub fn alert_warranted(check: &Check, new_state: Status) -> bool {
    check.has_been_checked() && check.state != new_state
}
