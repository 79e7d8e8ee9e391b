/* Licensed to the Apache Software Foundation (ASF) under one
 * or more contributor license agreements.  See the NOTICE file
 * distributed with this work for additional information
 * regarding copyright ownership.  The ASF licenses this file
 * to you under the Apache License, Version 2.0 (the
 * "License"); you may not use this file except in compliance
 * with the License.  You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing,
 * software distributed under the License is distributed on an
 * "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
 * KIND, either express or implied.  See the License for the
 * specific language governing permissions and limitations
 * under the License.
 */

use crate::error::condition::ErrorCondition;
use std::str::FromStr;
use thiserror::Error;

/// The error type shared by every crate of the client.
///
/// Service-side variants map one-to-one onto [`ErrorCondition`]; everything
/// after `Protocol` originates on the client side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventHubError {
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Message too large: {0}")]
    MessageTooLarge(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Operation not allowed: {0}")]
    NotAllowed(String),
    #[error("Resource limit exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Server busy: {0}")]
    ServerBusy(String),
    #[error("Service timed out: {0}")]
    ServiceTimeout(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Link stolen: {0}")]
    LinkStolen(String),
    #[error("Decode error: {0}")]
    DecodeError(String),
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(String),
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("Link redirected: {0}")]
    LinkRedirect(String),
    #[error("Link detach forced: {0}")]
    DetachForced(String),
    #[error("Session window violation: {0}")]
    SessionWindowViolation(String),
    #[error("Errant link: {0}")]
    ErrantLink(String),
    #[error("Handle in use: {0}")]
    HandleInUse(String),
    #[error("Unattached handle: {0}")]
    UnattachedHandle(String),
    #[error("Protocol error ({condition}): {description}")]
    Protocol {
        condition: String,
        description: String,
    },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Link closed: {0}")]
    LinkClosed(String),
    #[error("Operation timed out: {0}")]
    OperationTimeout(String),
    #[error("Lease not held for partition: {0}")]
    LeaseNotHeld(String),
    #[error("Lease conflict: {0}")]
    LeaseConflict(String),
    #[error("Lease lost for partition: {0}")]
    LeaseLost(String),
    #[error("Lease store error: {0}")]
    Store(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EventHubError {
    /// Maps a symbolic condition to its typed error. Unknown conditions pass
    /// through as [`EventHubError::Protocol`].
    pub fn from_condition(condition: &str, description: impl Into<String>) -> Self {
        let description = description.into();
        let Ok(known) = ErrorCondition::from_str(condition) else {
            return EventHubError::Protocol {
                condition: condition.to_owned(),
                description,
            };
        };

        match known {
            ErrorCondition::NotFound => EventHubError::NotFound(description),
            ErrorCondition::MessageSizeExceeded => EventHubError::MessageTooLarge(description),
            ErrorCondition::InternalError => EventHubError::InternalError(description),
            ErrorCondition::NotImplemented => EventHubError::NotImplemented(description),
            ErrorCondition::NotAllowed => EventHubError::NotAllowed(description),
            ErrorCondition::ResourceLimitExceeded => EventHubError::QuotaExceeded(description),
            ErrorCondition::UnauthorizedAccess => EventHubError::Unauthorized(description),
            ErrorCondition::ServerBusy => EventHubError::ServerBusy(description),
            ErrorCondition::Timeout => EventHubError::ServiceTimeout(description),
            ErrorCondition::PreconditionFailed => EventHubError::PreconditionFailed(description),
            ErrorCondition::LinkStolen => EventHubError::LinkStolen(description),
            ErrorCondition::DecodeError => EventHubError::DecodeError(description),
            ErrorCondition::ArgumentOutOfRange => EventHubError::ArgumentOutOfRange(description),
            ErrorCondition::InvalidField => EventHubError::InvalidField(description),
            ErrorCondition::LinkRedirect => EventHubError::LinkRedirect(description),
            ErrorCondition::DetachForced => EventHubError::DetachForced(description),
            ErrorCondition::SessionWindowViolation => {
                EventHubError::SessionWindowViolation(description)
            }
            ErrorCondition::ErrantLink => EventHubError::ErrantLink(description),
            ErrorCondition::HandleInUse => EventHubError::HandleInUse(description),
            ErrorCondition::UnattachedHandle => EventHubError::UnattachedHandle(description),
        }
    }

    /// Maps a request/response reply status to an error. An explicit
    /// `error-condition` on the reply wins over the status code.
    pub fn from_status_code(
        status_code: u16,
        description: impl Into<String>,
        condition: Option<&str>,
    ) -> Self {
        let description = description.into();
        if let Some(condition) = condition {
            return Self::from_condition(condition, description);
        }

        match ErrorCondition::from_status_code(status_code) {
            Some(condition) => Self::from_condition(condition.as_ref(), description),
            None => EventHubError::Protocol {
                condition: format!("status-code:{status_code}"),
                description,
            },
        }
    }

    /// The service-side condition this error represents, if any.
    pub fn condition(&self) -> Option<ErrorCondition> {
        let condition = match self {
            EventHubError::NotFound(_) => ErrorCondition::NotFound,
            EventHubError::MessageTooLarge(_) => ErrorCondition::MessageSizeExceeded,
            EventHubError::InternalError(_) => ErrorCondition::InternalError,
            EventHubError::NotImplemented(_) => ErrorCondition::NotImplemented,
            EventHubError::NotAllowed(_) => ErrorCondition::NotAllowed,
            EventHubError::QuotaExceeded(_) => ErrorCondition::ResourceLimitExceeded,
            EventHubError::Unauthorized(_) => ErrorCondition::UnauthorizedAccess,
            EventHubError::ServerBusy(_) => ErrorCondition::ServerBusy,
            EventHubError::ServiceTimeout(_) => ErrorCondition::Timeout,
            EventHubError::PreconditionFailed(_) => ErrorCondition::PreconditionFailed,
            EventHubError::LinkStolen(_) => ErrorCondition::LinkStolen,
            EventHubError::DecodeError(_) => ErrorCondition::DecodeError,
            EventHubError::ArgumentOutOfRange(_) => ErrorCondition::ArgumentOutOfRange,
            EventHubError::InvalidField(_) => ErrorCondition::InvalidField,
            EventHubError::LinkRedirect(_) => ErrorCondition::LinkRedirect,
            EventHubError::DetachForced(_) => ErrorCondition::DetachForced,
            EventHubError::SessionWindowViolation(_) => ErrorCondition::SessionWindowViolation,
            EventHubError::ErrantLink(_) => ErrorCondition::ErrantLink,
            EventHubError::HandleInUse(_) => ErrorCondition::HandleInUse,
            EventHubError::UnattachedHandle(_) => ErrorCondition::UnattachedHandle,
            _ => return None,
        };
        Some(condition)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventHubError::ServerBusy(_)
                | EventHubError::ServiceTimeout(_)
                | EventHubError::InternalError(_)
                | EventHubError::DetachForced(_)
                | EventHubError::OperationTimeout(_)
        )
    }
}

impl From<serde_json::Error> for EventHubError {
    fn from(error: serde_json::Error) -> Self {
        EventHubError::Serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;
    use test_case::test_case;

    #[test_case("amqp:not-found", EventHubError::NotFound("x".into()); "not found")]
    #[test_case("amqp:link:stolen", EventHubError::LinkStolen("x".into()); "link stolen")]
    #[test_case("com.microsoft:server-busy", EventHubError::ServerBusy("x".into()); "server busy")]
    #[test_case("amqp:resource-limit-exceeded", EventHubError::QuotaExceeded("x".into()); "quota")]
    #[test_case("amqp:session:unattached-handle", EventHubError::UnattachedHandle("x".into()); "unattached handle")]
    fn should_map_condition_to_typed_error(condition: &str, expected: EventHubError) {
        assert_eq!(EventHubError::from_condition(condition, "x"), expected);
    }

    #[test]
    fn should_pass_unknown_condition_through_as_protocol_error() {
        let error = EventHubError::from_condition("com.example:custom", "boom");
        assert_eq!(
            error,
            EventHubError::Protocol {
                condition: "com.example:custom".to_owned(),
                description: "boom".to_owned(),
            }
        );
        assert!(error.condition().is_none());
    }

    #[test]
    fn should_round_trip_every_known_condition() {
        for condition in ErrorCondition::iter() {
            let error = EventHubError::from_condition(condition.as_ref(), "d");
            assert_eq!(error.condition(), Some(condition));
        }
    }

    #[test_case(401, EventHubError::Unauthorized("d".into()); "unauthorized")]
    #[test_case(404, EventHubError::NotFound("d".into()); "not found")]
    #[test_case(503, EventHubError::ServerBusy("d".into()); "busy")]
    fn should_map_status_code(status: u16, expected: EventHubError) {
        assert_eq!(EventHubError::from_status_code(status, "d", None), expected);
    }

    #[test]
    fn should_prefer_explicit_condition_over_status_code() {
        let error = EventHubError::from_status_code(500, "d", Some("amqp:link:stolen"));
        assert_eq!(error, EventHubError::LinkStolen("d".into()));
    }

    #[test]
    fn should_classify_retryable_errors() {
        assert!(EventHubError::ServerBusy("d".into()).is_retryable());
        assert!(EventHubError::OperationTimeout("d".into()).is_retryable());
        assert!(!EventHubError::Unauthorized("d".into()).is_retryable());
        assert!(!EventHubError::LinkStolen("d".into()).is_retryable());
    }
}
