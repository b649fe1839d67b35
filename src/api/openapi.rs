use super::handlers::{health, verifier};
use utoipa::OpenApi;

/// `OpenAPI` document for the verifier service.
///
/// Add new endpoints here so they show up in the generated spec and in the
/// Swagger UI. Routes added outside (like `OPTIONS /health`) are
/// intentionally not documented.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        verifier::otp::send_otp,
        verifier::verify::verify_otp,
        verifier::scan::scan,
        verifier::logs::logs,
    ),
    components(schemas(
        health::Health,
        verifier::types::SendOtpRequest,
        verifier::types::SendOtpResponse,
        verifier::types::VerifyOtpRequest,
        verifier::types::VerifyOtpResponse,
        verifier::types::ScanRequest,
        verifier::types::ScanResponse,
        verifier::types::StudentProjection,
        verifier::types::VerifierActivityEntry,
        verifier::types::AuditEventEntry,
        verifier::types::LogsResponse,
    )),
    tags(
        (name = "verifier", description = "OTP login and single-use credential scans"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn openapi_documents_verifier_routes() {
        let spec = openapi();
        for path in [
            "/health",
            "/v1/verifier/send-otp",
            "/v1/verifier/verify-otp",
            "/v1/verifier/scan",
            "/v1/verifier/logs",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
