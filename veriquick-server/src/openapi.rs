//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3.0 document for the Veriquick API.

use utoipa::OpenApi;

use crate::handlers::{
    DecodeResponse, HealthResponse, IntakeFormat, IntakeResponse, ReadyResponse, WarningEntry,
};

/// Veriquick API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Veriquick API",
        version = "0.1.0",
        description = r#"
## Identity document intake with QR hand-off

1. **Upload** Aadhaar, PAN and marksheet scans via `POST /intake`
2. Each file is stored, given a shared link and classified by the identifiers it contains
3. The batch comes back as a manifest rendered into **one QR symbol**
4. **Decode** a photographed or saved symbol via `POST /decode`

Aadhaar-only documents whose numbers validate can be verified automatically;
everything else is routed to manual verification by the scanner.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers((url = "http://localhost:3000", description = "Local development server")),
    tags(
        (name = "Intake", description = "Store, classify and encode document batches"),
        (name = "Decode", description = "Read manifests back from QR images"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::intake::intake_handler,
        crate::handlers::decode::decode_handler,
    ),
    components(schemas(
        HealthResponse,
        ReadyResponse,
        IntakeFormat,
        IntakeResponse,
        WarningEntry,
        DecodeResponse,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_endpoints() {
        let doc = ApiDoc::openapi();
        for path in ["/intake", "/decode", "/health", "/ready"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
