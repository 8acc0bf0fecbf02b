// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use crate::{types::Balance, Error};

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Networks whose validators can be ranked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Local,
    Polkadot,
    Kusama,
    Westend,
    #[default]
    Paseo,
}

impl NetworkId {
    /// Every supported network.
    pub const ALL: [NetworkId; 5] = [
        NetworkId::Local,
        NetworkId::Polkadot,
        NetworkId::Kusama,
        NetworkId::Westend,
        NetworkId::Paseo,
    ];

    /// Lower-case name, also used in cache keys.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Polkadot => "polkadot",
            Self::Kusama => "kusama",
            Self::Westend => "westend",
            Self::Paseo => "paseo",
        }
    }

    /// Token symbol.
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Local | Self::Polkadot => "DOT",
            Self::Kusama => "KSM",
            Self::Westend => "WND",
            Self::Paseo => "PAS",
        }
    }

    /// Number of decimals between the base unit and one token.
    pub fn decimals(&self) -> u32 {
        match self {
            Self::Local | Self::Polkadot | Self::Paseo => 10,
            Self::Kusama | Self::Westend => 12,
        }
    }

    /// SS58 address prefix.
    pub fn ss58(&self) -> u16 {
        match self {
            Self::Local | Self::Polkadot | Self::Paseo => 0,
            Self::Kusama => 2,
            Self::Westend => 42,
        }
    }

    /// Public RPC endpoints, as `(provider name, url)`.
    pub fn rpc_endpoints(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Local => &[("Local Node", "ws://127.0.0.1:9944")],
            Self::Polkadot => &[
                ("Automata 1RPC", "wss://1rpc.io/dot"),
                ("Dwellir", "wss://polkadot-rpc.dwellir.com"),
                ("IBP-GeoDNS1", "wss://rpc.ibp.network/polkadot"),
                ("IBP-GeoDNS2", "wss://rpc.dotters.network/polkadot"),
                ("LuckyFriday", "wss://rpc-polkadot.luckyfriday.io"),
                ("OnFinality", "wss://polkadot.api.onfinality.io/public-ws"),
                ("Stakeworld", "wss://dot-rpc.stakeworld.io"),
                ("Parity", "wss://rpc.polkadot.io"),
            ],
            Self::Kusama => &[
                ("Automata 1RPC", "wss://1rpc.io/ksm"),
                ("Dwellir", "wss://kusama-rpc.dwellir.com"),
                ("IBP-GeoDNS1", "wss://rpc.ibp.network/kusama"),
                ("IBP-GeoDNS2", "wss://rpc.dotters.network/kusama"),
                ("LuckyFriday", "wss://rpc-kusama.luckyfriday.io"),
                ("OnFinality", "wss://kusama.api.onfinality.io/public-ws"),
                ("Stakeworld", "wss://ksm-rpc.stakeworld.io"),
            ],
            Self::Westend => &[
                ("Dwellir", "wss://westend-rpc.dwellir.com"),
                ("IBP-GeoDNS1", "wss://rpc.ibp.network/westend"),
                ("IBP-GeoDNS2", "wss://rpc.dotters.network/westend"),
                ("LuckyFriday", "wss://rpc-westend.luckyfriday.io"),
                ("OnFinality", "wss://westend.api.onfinality.io/public-ws"),
                ("Stakeworld", "wss://wnd-rpc.stakeworld.io"),
            ],
            Self::Paseo => &[
                ("Parity", "wss://rpc.paseo.polkadot.io"),
                ("Dwellir", "wss://paseo-rpc.dwellir.com"),
                ("IBP-GeoDNS1", "wss://rpc.ibp.network/paseo"),
                ("IBP-GeoDNS2", "wss://rpc.dotters.network/paseo"),
                ("LuckyFriday", "wss://rpc-paseo.luckyfriday.io"),
                ("OnFinality", "wss://paseo.api.onfinality.io/public-ws"),
                ("Stakeworld", "wss://paseo-rpc.stakeworld.io"),
            ],
        }
    }

    /// Renders a base-unit balance in this network's token.
    pub fn format_stake(&self, balance: Balance) -> String {
        format!("{} {}", format_stake(balance, self.decimals()), self.unit())
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for NetworkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|network| network.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownNetwork(s.to_string()))
    }
}

/// Renders `balance` as `whole.fraction`, with the fraction zero padded to `decimals` digits
/// and left out when it is zero.
pub fn format_stake(balance: Balance, decimals: u32) -> String {
    let divisor = match 10u128.checked_pow(decimals) {
        Some(divisor) => divisor,
        None => return balance.to_string(),
    };
    let whole = balance / divisor;
    let fraction = balance % divisor;

    if fraction == 0 {
        return whole.to_string();
    }

    format!("{whole}.{fraction:0>width$}", width = decimals as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn names_round_trip_through_from_str() {
        for network in NetworkId::ALL {
            assert_eq!(network.name().parse::<NetworkId>().ok(), Some(network));
        }
        assert_eq!("Polkadot".parse::<NetworkId>().ok(), Some(NetworkId::Polkadot));
        assert_matches!("rococo".parse::<NetworkId>(), Err(Error::UnknownNetwork(name)) if name == "rococo");
    }

    #[test]
    fn default_network_is_paseo() {
        assert_eq!(NetworkId::default(), NetworkId::Paseo);
        assert_eq!(NetworkId::default().unit(), "PAS");
    }

    #[test]
    fn whole_amounts_have_no_fraction() {
        assert_eq!(format_stake(20_000_000_000, 10), "2");
        assert_eq!(format_stake(0, 10), "0");
    }

    #[test]
    fn fractions_are_zero_padded() {
        assert_eq!(format_stake(15_000_000_000, 10), "1.5000000000");
        assert_eq!(format_stake(1, 10), "0.0000000001");
        assert_eq!(format_stake(1_000_000_000_001, 12), "1.000000000001");
    }

    #[test]
    fn network_formatting_uses_its_unit_and_decimals() {
        assert_eq!(NetworkId::Kusama.format_stake(2_000_000_000_000), "2 KSM");
        assert_eq!(NetworkId::Polkadot.format_stake(10_000_000_000), "1 DOT");
    }

    #[test]
    fn every_network_lists_endpoints() {
        for network in NetworkId::ALL {
            assert!(!network.rpc_endpoints().is_empty());
        }
    }
}
