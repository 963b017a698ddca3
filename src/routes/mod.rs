mod auth;
mod health_check;

pub use auth::{
    confirm_password_reset, get_current_user, login, logout, refresh, register,
    request_password_reset, verify_email,
};
pub use health_check::health_check;
