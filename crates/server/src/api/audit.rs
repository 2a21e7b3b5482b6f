//! Structured audit logging for admission rejections.
//!
//! Every request the gate turns away emits one event with `target: "audit"`,
//! so operators can filter or route them via `RUST_LOG=audit=info`.
//! Keys are masked before they reach the log.

/// Mask an API key for safe logging: first 8 chars + "...".
pub fn mask_key(token: &str) -> String {
    match token.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &token[..idx]),
        None => "***".to_string(),
    }
}

/// Extract client IP from request headers (X-Forwarded-For → X-Real-IP → "-").
pub fn extract_client_ip(req: &axum::http::Request<axum::body::Body>) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or("-").trim().to_string())
        .or_else(|| {
            req.headers()
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "-".to_string())
}

/// Emit a structured audit entry for a rejected request.
///
/// `actor` is an already-masked key (or `"anonymous"`); `outcome` is the
/// rejection reason, matching the `outcome` label of `keygate_admissions_total`.
pub fn audit_rejection(actor: &str, client_ip: &str, path: &str, outcome: &str) {
    tracing::info!(
        target: "audit",
        actor = %actor,
        client_ip = %client_ip,
        path = %path,
        outcome = %outcome,
        "request rejected"
    );
}
