// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use crate::{provider::ChainStateProvider, Error, Result};

use serde::{Deserialize, Serialize};

/// Whether a nominator currently backs a validator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelegationStatus {
    NotNominated,
    /// `active` is whether the validator is in the current session set.
    Nominated { active: bool },
}

impl DelegationStatus {
    pub fn is_nominated(&self) -> bool {
        matches!(self, Self::Nominated { .. })
    }
}

/// Checks the nominator entries for `nominator` targeting `validator`.
#[instrument(skip(provider), level = "debug")]
pub async fn verify_delegation<P>(
    provider: &P,
    nominator: &str,
    validator: &str,
) -> Result<DelegationStatus>
where
    P: ChainStateProvider + ?Sized,
{
    let nominations = provider
        .nominators()
        .await
        .map_err(Error::DirectoryFetchFailed)?;

    let nominated = nominations
        .iter()
        .filter(|entry| entry.nominator == nominator)
        .any(|entry| entry.targets.iter().any(|target| target == validator));
    if !nominated {
        debug!("{nominator} does not nominate {validator}");
        return Ok(DelegationStatus::NotNominated);
    }

    let active = match provider.session_validators().await {
        Ok(session) => session.iter().any(|address| address == validator),
        Err(error) if error.is_unsupported() => true,
        Err(error) => return Err(Error::DirectoryFetchFailed(error)),
    };

    Ok(DelegationStatus::Nominated { active })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{provider::ProviderError, test_utils::MockProvider};
    use assert_matches::assert_matches;
    use eyre::Result;

    #[tokio::test]
    async fn nomination_and_session_membership_are_reported() -> Result<()> {
        let provider = MockProvider::new()
            .with_nomination("alice", &["v1", "v2"])
            .with_nomination("bob", &["v3"])
            .with_session_validators(&["v1"]);

        assert_eq!(
            verify_delegation(&provider, "alice", "v1").await?,
            DelegationStatus::Nominated { active: true }
        );
        assert_eq!(
            verify_delegation(&provider, "alice", "v2").await?,
            DelegationStatus::Nominated { active: false }
        );
        assert_eq!(
            verify_delegation(&provider, "alice", "v3").await?,
            DelegationStatus::NotNominated
        );
        assert!(!verify_delegation(&provider, "carol", "v1").await?.is_nominated());
        Ok(())
    }

    #[tokio::test]
    async fn without_session_data_nominated_validators_count_as_active() -> Result<()> {
        let provider = MockProvider::new().with_nomination("alice", &["v1"]);

        let status = verify_delegation(&provider, "alice", "v1").await?;

        assert_eq!(status, DelegationStatus::Nominated { active: true });
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_nominators_table_is_an_error() {
        let provider = MockProvider::new();

        let res = verify_delegation(&provider, "alice", "v1").await;

        assert_matches!(res, Err(Error::DirectoryFetchFailed(ProviderError::Unsupported(_))));
    }
}
