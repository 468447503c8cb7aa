use axum::response::IntoResponse;

use super::session_cookie::Viewer;

pub async fn root_handler(Viewer(viewer): Viewer) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    let greeting = match viewer {
        Some(context) => format!(
            "Signed in as @{} ({})",
            context.user.username, context.user.display_name
        ),
        None => "Not signed in".to_string(),
    };
    format!(
        r#"Passkey Share 🔑
Version: {version}
{greeting}

Available endpoints:
  - POST   /attestation/options       - Start passkey registration
  - POST   /attestation/result        - Finish passkey registration
  - POST   /assertion/options         - Start passkey sign-in
  - POST   /assertion/result          - Finish passkey sign-in
  - GET    /login, /register          - Remember ?returnTo for after sign-in
  - POST   /signout                   - End the session
  - GET    /account                   - Profile and passkeys
  - PUT    /account/profile           - Change display name
  - DELETE /account/credentials/{{id}} - Remove a passkey
  - GET    /invites, POST /invites    - List or create invites (admins)
  - GET    /invites/{{id}}             - View an invite
  - POST   /invites/{{id}}             - Claim an invite
  - GET    /shares, POST /shares      - List or create document shares
  - GET    /shares/{{id}}              - View a share
  - POST   /shares/{{id}}              - Claim a share
  - GET    /health                    - Light health check
  - GET    /health?mode=full          - Full health check (includes session store)
  - GET    /metrics                   - Prometheus metrics
"#
    )
}
