// Bearer-token identity for the HTTP edge
pub mod jwt;
pub mod middleware;

pub use jwt::{bearer_token, token_from_query, Claims, JwtValidator};
pub use middleware::{current_user, AuthMiddleware};
