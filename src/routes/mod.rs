mod admin;
mod auth;
mod health_check;

pub use admin::sweep_sessions;
pub use auth::{
    change_password, get_user_info, login, logout, logout_all, refresh, register,
    ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
};
pub use health_check::health_check;
