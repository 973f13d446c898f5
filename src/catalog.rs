//! Fixed catalog of exchange-traded funds offered for the savings projection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Etf {
    #[default]
    Spy,
    Qqq,
    Vwo,
    Ivv,
    Dia,
    Iwm,
    Efa,
    Agg,
    Vnq,
    Xlk,
    Xle,
    Arkk,
    Voo,
    Schd,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown ticker: {0}")]
pub struct UnknownTicker(pub String);

impl Etf {
    pub const ALL: [Etf; 14] = [
        Etf::Spy,
        Etf::Qqq,
        Etf::Vwo,
        Etf::Ivv,
        Etf::Dia,
        Etf::Iwm,
        Etf::Efa,
        Etf::Agg,
        Etf::Vnq,
        Etf::Xlk,
        Etf::Xle,
        Etf::Arkk,
        Etf::Voo,
        Etf::Schd,
    ];

    pub fn ticker(self) -> &'static str {
        match self {
            Etf::Spy => "SPY",
            Etf::Qqq => "QQQ",
            Etf::Vwo => "VWO",
            Etf::Ivv => "IVV",
            Etf::Dia => "DIA",
            Etf::Iwm => "IWM",
            Etf::Efa => "EFA",
            Etf::Agg => "AGG",
            Etf::Vnq => "VNQ",
            Etf::Xlk => "XLK",
            Etf::Xle => "XLE",
            Etf::Arkk => "ARKK",
            Etf::Voo => "VOO",
            Etf::Schd => "SCHD",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Etf::Spy => "SPDR S&P 500 ETF Trust",
            Etf::Qqq => "Invesco QQQ Trust",
            Etf::Vwo => "Vanguard Emerging Markets ETF",
            Etf::Ivv => "iShares Core S&P 500 ETF",
            Etf::Dia => "SPDR Dow Jones Industrial Average ETF Trust",
            Etf::Iwm => "iShares Russell 2000 ETF",
            Etf::Efa => "iShares MSCI EAFE ETF",
            Etf::Agg => "iShares Core U.S. Aggregate Bond ETF",
            Etf::Vnq => "Vanguard Real Estate ETF",
            Etf::Xlk => "Technology Select Sector SPDR Fund",
            Etf::Xle => "Energy Select Sector SPDR Fund",
            Etf::Arkk => "ARK Innovation ETF",
            Etf::Voo => "Vanguard S&P 500 ETF",
            Etf::Schd => "Schwab U.S. Dividend Equity ETF",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Etf::Spy => "Leading companies of the S&P 500.",
            Etf::Qqq => "Technology companies of the Nasdaq.",
            Etf::Vwo => "Global emerging markets.",
            Etf::Ivv => "Tracks the S&P 500 index.",
            Etf::Dia => "Companies in the Dow Jones index.",
            Etf::Iwm => "Small U.S. companies.",
            Etf::Efa => "Developed markets outside the U.S. and Canada.",
            Etf::Agg => "U.S. bond market.",
            Etf::Vnq => "U.S. real estate sector.",
            Etf::Xlk => "Technology stocks of the S&P 500.",
            Etf::Xle => "Energy sector of the S&P 500.",
            Etf::Arkk => "Innovative technology companies.",
            Etf::Voo => "Diversified investment in the S&P 500.",
            Etf::Schd => "High-dividend companies.",
        }
    }
}

impl fmt::Display for Etf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ticker())
    }
}

impl FromStr for Etf {
    type Err = UnknownTicker;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Etf::ALL
            .into_iter()
            .find(|etf| etf.ticker().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownTicker(wanted.to_string()))
    }
}

impl Serialize for Etf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.ticker())
    }
}

impl<'de> Deserialize<'de> for Etf {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtfInfo {
    pub ticker: Etf,
    pub name: &'static str,
    pub description: &'static str,
}

impl From<Etf> for EtfInfo {
    fn from(etf: Etf) -> Self {
        Self {
            ticker: etf,
            name: etf.name(),
            description: etf.description(),
        }
    }
}

pub fn catalog() -> Vec<EtfInfo> {
    Etf::ALL.into_iter().map(EtfInfo::from).collect()
}
