//! Authentication handlers

// @CODE:SPEC-AUTH-001 impl - login handler
pub fn login(email: &str, password: &str) -> bool {
    /* @SEC:SPEC-AUTH-001 related - constant time compare */
    !email.is_empty() && !password.is_empty()
}

// @CODE:SPEC-AUTH-002 - session expiry
pub fn expire_sessions() {}

// @CODE:spec-auth-003 impl
pub fn logout() {}
