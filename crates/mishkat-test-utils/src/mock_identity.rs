// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use mishkat_core::{Identity, IdentityProvider, UserId};

/// Identity provider with a fixed signed-in user, or nobody.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    identity: Option<Identity>,
}

impl StaticIdentity {
    pub fn signed_in(user_id: &str, display_name: &str) -> Self {
        Self {
            identity: Some(Identity {
                user_id: UserId::new(user_id),
                display_name: display_name.to_string(),
            }),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<Identity> {
        self.identity.clone()
    }
}
