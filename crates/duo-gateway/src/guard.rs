//! Author-only checks for edit and delete.

use uuid::Uuid;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Unauthorized,
}

/// The only rule there is: you may change what you wrote.
pub fn authorize(actor: Uuid, author: Uuid) -> Authorization {
    if actor == author {
        Authorization::Authorized
    } else {
        Authorization::Unauthorized
    }
}

pub fn ensure_author(actor: Uuid, author: Uuid) -> Result<(), GatewayError> {
    match authorize(actor, author) {
        Authorization::Authorized => Ok(()),
        Authorization::Unauthorized => Err(GatewayError::Unauthorized),
    }
}
