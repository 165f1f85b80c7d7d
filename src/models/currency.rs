use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ParseEnumError;

/// Currencies a user can hold a balance in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Currency {
    Usd,
    Btc,
    Ltc,
    Doge,
    Trx,
    Ves,
    UsdtTrc20,
    UsdtFiat,
}

impl Currency {
    pub const ALL: [Currency; 8] = [
        Currency::Usd,
        Currency::Btc,
        Currency::Ltc,
        Currency::Doge,
        Currency::Trx,
        Currency::Ves,
        Currency::UsdtTrc20,
        Currency::UsdtFiat,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Btc => "BTC",
            Currency::Ltc => "LTC",
            Currency::Doge => "DOGE",
            Currency::Trx => "TRX",
            Currency::Ves => "VES",
            Currency::UsdtTrc20 => "USDT-TRC20",
            Currency::UsdtFiat => "USDT-FIAT",
        }
    }

    /// Name of the balance field on the user document.
    pub fn field_name(&self) -> &'static str {
        match self {
            Currency::Usd => "balanceUSD",
            Currency::Btc => "balanceBTC",
            Currency::Ltc => "balanceLTC",
            Currency::Doge => "balanceDOGE",
            Currency::Trx => "balanceTRX",
            Currency::Ves => "balanceVES",
            Currency::UsdtTrc20 => "balanceUSDTTRC20",
            Currency::UsdtFiat => "balanceUSDTFiat",
        }
    }

    pub fn from_field_name(field: &str) -> Option<Currency> {
        Currency::ALL
            .into_iter()
            .find(|currency| currency.field_name() == field)
    }
}

impl FromStr for Currency {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(currency) = Currency::from_field_name(s) {
            return Ok(currency);
        }

        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "BTC" => Ok(Currency::Btc),
            "LTC" => Ok(Currency::Ltc),
            "DOGE" => Ok(Currency::Doge),
            "TRX" => Ok(Currency::Trx),
            "VES" => Ok(Currency::Ves),
            "USDT-TRC20" | "USDT_TRC20" | "USDTTRC20" | "TRC20" => Ok(Currency::UsdtTrc20),
            "USDT-FIAT" | "USDT_FIAT" | "USDTFIAT" | "USDT" => Ok(Currency::UsdtFiat),
            _ => Err(ParseEnumError::new("currency", s)),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_follow_balance_prefix() {
        assert_eq!(Currency::Usd.field_name(), "balanceUSD");
        assert_eq!(Currency::UsdtTrc20.field_name(), "balanceUSDTTRC20");
        assert_eq!(Currency::UsdtFiat.field_name(), "balanceUSDTFiat");
    }

    #[test]
    fn parses_codes_aliases_and_field_names() {
        assert_eq!("doge".parse::<Currency>().unwrap(), Currency::Doge);
        assert_eq!("USDT_TRC20".parse::<Currency>().unwrap(), Currency::UsdtTrc20);
        assert_eq!("usdt".parse::<Currency>().unwrap(), Currency::UsdtFiat);
        assert_eq!("balanceVES".parse::<Currency>().unwrap(), Currency::Ves);
        assert!("EUR".parse::<Currency>().is_err());
    }

    #[test]
    fn every_code_round_trips() {
        for currency in Currency::ALL {
            assert_eq!(currency.code().parse::<Currency>().unwrap(), currency);
        }
    }
}
