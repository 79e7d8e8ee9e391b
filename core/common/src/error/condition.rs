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

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Symbolic error conditions carried by detach frames, delivery
/// dispositions and request/response status replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
pub enum ErrorCondition {
    #[strum(serialize = "amqp:not-found")]
    NotFound,
    #[strum(serialize = "amqp:link:message-size-exceeded")]
    MessageSizeExceeded,
    #[strum(serialize = "amqp:internal-error")]
    InternalError,
    #[strum(serialize = "amqp:not-implemented")]
    NotImplemented,
    #[strum(serialize = "amqp:not-allowed")]
    NotAllowed,
    #[strum(serialize = "amqp:resource-limit-exceeded")]
    ResourceLimitExceeded,
    #[strum(serialize = "amqp:unauthorized-access")]
    UnauthorizedAccess,
    #[strum(serialize = "com.microsoft:server-busy")]
    ServerBusy,
    #[strum(serialize = "com.microsoft:timeout")]
    Timeout,
    #[strum(serialize = "amqp:precondition-failed")]
    PreconditionFailed,
    #[strum(serialize = "amqp:link:stolen")]
    LinkStolen,
    #[strum(serialize = "amqp:decode-error")]
    DecodeError,
    #[strum(serialize = "com.microsoft:argument-out-of-range")]
    ArgumentOutOfRange,
    #[strum(serialize = "amqp:invalid-field")]
    InvalidField,
    #[strum(serialize = "amqp:link:redirect")]
    LinkRedirect,
    #[strum(serialize = "amqp:link:detach-forced")]
    DetachForced,
    #[strum(serialize = "amqp:session:window-violation")]
    SessionWindowViolation,
    #[strum(serialize = "amqp:session:errant-link")]
    ErrantLink,
    #[strum(serialize = "amqp:session:handle-in-use")]
    HandleInUse,
    #[strum(serialize = "amqp:session:unattached-handle")]
    UnattachedHandle,
}

impl ErrorCondition {
    /// Condition implied by a request/response status code, if any.
    pub fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            400 => Some(ErrorCondition::ArgumentOutOfRange),
            401 => Some(ErrorCondition::UnauthorizedAccess),
            403 => Some(ErrorCondition::NotAllowed),
            404 => Some(ErrorCondition::NotFound),
            409 => Some(ErrorCondition::PreconditionFailed),
            413 => Some(ErrorCondition::MessageSizeExceeded),
            500 => Some(ErrorCondition::InternalError),
            501 => Some(ErrorCondition::NotImplemented),
            503 => Some(ErrorCondition::ServerBusy),
            504 => Some(ErrorCondition::Timeout),
            _ => None,
        }
    }
}
