use serde::{Deserialize, Serialize};

/// JWT claims of an interactive-session token minted by the surrounding
/// authorization server. Only the fields this service consumes.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: usize,  // expiration time
    pub iat: usize,  // issued at
}

/// Current authenticated principal (extracted from JWT)
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}
