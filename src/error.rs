use thiserror::Error;

#[derive(Error, Debug)]
pub enum EntractlError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Graph API error: {0}")]
    GraphApiError(String),

    /// Graph answered 404 for the requested resource
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Interactive prompt error: {0}")]
    DialoguerError(#[from] dialoguer::Error),

    #[error("Token not found. Please run 'entractl login' first")]
    TokenNotFound,

    #[error("Tenant '{0}' not found")]
    TenantNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, EntractlError>;

/// Parse Graph API error response and provide helpful context
pub fn enhance_graph_error(error_response: &str) -> String {
    let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_response) else {
        return error_response.to_string();
    };
    let Some(error_obj) = error_json.get("error") else {
        return error_response.to_string();
    };

    let code = error_obj
        .get("code")
        .and_then(|c| c.as_str())
        .unwrap_or("Unknown");
    let message = error_obj
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("No message");

    format!("{}: {}{}", code, message, hint_for(code, message))
}

fn hint_for(code: &str, message: &str) -> &'static str {
    match code {
        "Unauthorized" | "InvalidAuthenticationToken" => {
            "\nHint: Your authentication token may have expired. Try running 'entractl login' again."
        }
        "Forbidden" | "InsufficientPrivileges" | "Authorization_RequestDenied" => {
            "\nHint: Membership changes need GroupMember.ReadWrite.All (and Device.Read.All for devices) with admin consent."
        }
        "Request_BadRequest" | "BadRequest" => {
            if message.contains("added object references already exist") {
                "\nHint: The object is already a member of this group."
            } else if message.contains("dynamic membership") {
                "\nHint: Dynamic groups cannot be edited directly. Change the membership rule instead."
            } else {
                "\nHint: The request format may be incorrect."
            }
        }
        "Request_ResourceNotFound" | "NotFound" => {
            "\nHint: The requested object doesn't exist. Check the group or object ID."
        }
        "TooManyRequests" => "\nHint: API rate limit exceeded. Wait a moment and try again.",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhance_graph_error_extracts_code_and_message() {
        let body = r#"{"error":{"code":"Request_ResourceNotFound","message":"Resource 'abc' does not exist."}}"#;
        let enhanced = enhance_graph_error(body);
        assert!(enhanced.starts_with("Request_ResourceNotFound: Resource 'abc' does not exist."));
        assert!(enhanced.contains("Hint:"));
    }

    #[test]
    fn test_enhance_graph_error_duplicate_member_hint() {
        let body = r#"{"error":{"code":"Request_BadRequest","message":"One or more added object references already exist for the following modified properties: 'members'."}}"#;
        assert!(enhance_graph_error(body).contains("already a member"));
    }

    #[test]
    fn test_enhance_graph_error_passes_through_non_json() {
        assert_eq!(enhance_graph_error("gateway timeout"), "gateway timeout");
        assert_eq!(enhance_graph_error(r#"{"other":1}"#), r#"{"other":1}"#);
    }

    #[test]
    fn test_unknown_code_has_no_hint() {
        let body = r#"{"error":{"code":"Weird","message":"odd"}}"#;
        assert_eq!(enhance_graph_error(body), "Weird: odd");
    }
}
