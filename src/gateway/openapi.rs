//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8000/docs`
//! - OpenAPI JSON: `http://localhost:8000/api-docs/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::account::{Account, AccountPatch, TransferOutcome};
use crate::error::ErrorResponse;
use crate::gateway::handlers::{CreateAccountRequest, HealthResponse, ServiceInfo};

/// Bearer token issued by the user service
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Token issued by the user service at login. Tokens pushed over \
                             the token channel are accepted from cache; others are verified \
                             as JWT.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Account Management API",
        version = "1.0.0",
        description = "Per-user account balances with deposit, withdrawal and transfer."
    ),
    servers(
        (url = "http://localhost:8000", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::root,
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::list_accounts,
        crate::gateway::handlers::get_account,
        crate::gateway::handlers::get_account_by_user,
        crate::gateway::handlers::create_account,
        crate::gateway::handlers::update_account,
        crate::gateway::handlers::delete_account,
        crate::gateway::handlers::deposit,
        crate::gateway::handlers::withdraw,
        crate::gateway::handlers::transfer,
    ),
    components(
        schemas(
            Account,
            AccountPatch,
            CreateAccountRequest,
            TransferOutcome,
            ErrorResponse,
            HealthResponse,
            ServiceInfo,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Accounts", description = "Account balances and money movement (auth required)"),
        (name = "System", description = "Health checks and service info")
    )
)]
pub struct ApiDoc;
