use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::configuration::ApplicationSettings;
use crate::error::{AppError, ValidationError};
use crate::middleware::{
    Cors, JwtMiddleware, RateLimit, Recovery, RequestLogger, RequireRole, TimeoutGuard,
};
use crate::rate_limiter::RateLimiter;
use crate::routes::{
    change_password, get_user_info, health_check, login, logout, logout_all, refresh, register,
    sweep_sessions,
};

pub const ADMIN_ROLE: &str = "admin";

/// Build and start the HTTP server on an already bound listener.
///
/// The rate limiter is created once by the caller and shared by every worker.
pub fn run(
    listener: TcpListener,
    auth: AuthService,
    limiter: Arc<RateLimiter>,
    settings: ApplicationSettings,
) -> Result<Server, std::io::Error> {
    let codec = auth.codec().clone();
    let auth = web::Data::new(auth);

    let server = HttpServer::new(move || {
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            AppError::Validation(ValidationError::InvalidFormat(format!(
                "request body: {}",
                err
            )))
            .into()
        });

        // Wrapped innermost first: the last `wrap` runs first on a request
        App::new()
            .wrap(RateLimit::new(limiter.clone()))
            .wrap(TimeoutGuard::new(settings.request_timeout()))
            .wrap(Cors::new(settings.version.clone()))
            .wrap(RequestLogger)
            .wrap(Recovery)
            // Shared state
            .app_data(auth.clone())
            .app_data(json_config)
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    // Protected routes (require JWT authentication)
                    .service(
                        web::resource("/userinfo")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::get().to(get_user_info)),
                    )
                    .service(
                        web::resource("/change-password")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::post().to(change_password)),
                    )
                    .service(
                        web::resource("/logout-all")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::post().to(logout_all)),
                    ),
            )
            .service(
                web::resource("/api/admin/sessions/sweep")
                    .wrap(RequireRole::new(ADMIN_ROLE))
                    .wrap(JwtMiddleware::new(codec.clone()))
                    .route(web::post().to(sweep_sessions)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
