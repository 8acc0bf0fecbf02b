// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use crate::{
    provider::{with_timeout, ChainStateProvider},
    types::EraIndex,
    EngineConfig, Error, Result,
};

use backoff::backoff::{Backoff, Constant};
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Resolves the era all downstream computation is keyed to.
///
/// A failed query, or an era of `0` reported by a bootstrapping chain, counts as "not yet
/// available". Attempts are spaced by a fixed delay, and once `era_max_retries` attempts are
/// spent this fails with [`Error::EraUnavailable`], which callers should surface as is rather
/// than retry again.
///
/// A single attempt may not outlast the retry delay, and the whole resolution is capped at
/// `era_max_retries` times that, so an unresponsive chain fails as fast as an erroring one.
#[instrument(skip_all, level = "debug")]
pub async fn resolve_current_era<P>(provider: &P, config: &EngineConfig) -> Result<EraIndex>
where
    P: ChainStateProvider + ?Sized,
{
    let attempts = config.era_max_retries;
    let delay = config.era_retry_delay();
    let attempt_timeout = if delay.is_zero() {
        config.fetch_timeout()
    } else {
        config.fetch_timeout().min(delay)
    };
    let budget = delay
        .max(attempt_timeout)
        .saturating_mul(u32::try_from(attempts).unwrap_or(u32::MAX));

    match timeout(budget, retry_era(provider, attempts, delay, attempt_timeout)).await {
        Ok(Some(era)) => Ok(era),
        Ok(None) => {
            error!("Giving up on resolving the current era after {attempts} attempts");
            Err(Error::EraUnavailable { attempts })
        }
        Err(_) => {
            error!("Giving up on resolving the current era after {budget:?}");
            Err(Error::EraUnavailable { attempts })
        }
    }
}

async fn retry_era<P>(
    provider: &P,
    attempts: usize,
    delay: Duration,
    attempt_timeout: Duration,
) -> Option<EraIndex>
where
    P: ChainStateProvider + ?Sized,
{
    let mut backoff = Constant::new(delay);

    for attempt in 1..=attempts {
        match with_timeout(attempt_timeout, provider.current_era()).await {
            Ok(Some(era)) if era > 0 => {
                debug!("Resolved current era {era} on attempt {attempt}");
                return Some(era);
            }
            Ok(_) => debug!("Current era not yet available (attempt {attempt}/{attempts})"),
            Err(error) => {
                warn!("Failed to query current era (attempt {attempt}/{attempts}): {error}")
            }
        }

        if attempt < attempts {
            if let Some(delay) = backoff.next_backoff() {
                trace!("Sleeping {delay:?} before querying the era again");
                sleep(delay).await;
            }
        }
    }

    None
}
