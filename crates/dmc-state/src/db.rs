use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use dmc_core::chain::MemoryChain;
use dmc_core::error::DmcError;
use dmc_core::event::Event;
use dmc_dividend::DividendEngine;
use dmc_exchange::ExchangeEngine;
use dmc_storage::DataStorageMarket;

use crate::engine::MarketState;

const CHAIN_KEY: &str = "chain";
const DIVIDEND_KEY: &str = "dividend";
const EXCHANGE_KEY: &str = "exchange";
const STORAGE_KEY: &str = "storage";

fn storage_err(e: sled::Error) -> DmcError {
    DmcError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, DmcError> {
    bincode::serialize(value).map_err(|e| DmcError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DmcError> {
    bincode::deserialize(bytes).map_err(|e| DmcError::Serialization(e.to_string()))
}

/// Persistent market database backed by sled.
///
/// Named trees:
///   engines: engine name  → bincode(engine state)
///   events : u64 BE index → bincode(Event)
///   meta   : utf8 key     → raw bytes
pub struct StateDb {
    _db: sled::Db,
    engines: sled::Tree,
    events: sled::Tree,
    meta: sled::Tree,
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DmcError> {
        let db = sled::open(path).map_err(storage_err)?;
        Self::from_db(db)
    }

    /// A throwaway database removed when dropped.
    pub fn temporary() -> Result<Self, DmcError> {
        let db = sled::Config::new().temporary(true).open().map_err(storage_err)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, DmcError> {
        let engines = db.open_tree("engines").map_err(storage_err)?;
        let events = db.open_tree("events").map_err(storage_err)?;
        let meta = db.open_tree("meta").map_err(storage_err)?;
        Ok(Self { _db: db, engines, events, meta })
    }

    // ── Engines ──────────────────────────────────────────────────────────────

    pub fn has_state(&self) -> Result<bool, DmcError> {
        self.engines.contains_key(CHAIN_KEY).map_err(storage_err)
    }

    /// Write every engine in one batch.
    pub fn put_state(&self, state: &MarketState) -> Result<(), DmcError> {
        let mut batch = sled::Batch::default();
        batch.insert(CHAIN_KEY, encode(&state.chain)?);
        batch.insert(DIVIDEND_KEY, encode(&state.dividend)?);
        batch.insert(EXCHANGE_KEY, encode(&state.exchange)?);
        batch.insert(STORAGE_KEY, encode(&state.storage)?);
        self.engines.apply_batch(batch).map_err(storage_err)
    }

    pub fn get_state(&self) -> Result<Option<MarketState>, DmcError> {
        let Some(chain) = self.get_engine::<MemoryChain>(CHAIN_KEY)? else {
            return Ok(None);
        };
        let missing = |name: &str| DmcError::Storage(format!("engine `{name}` missing from database"));
        Ok(Some(MarketState {
            chain,
            dividend: self
                .get_engine::<DividendEngine>(DIVIDEND_KEY)?
                .ok_or_else(|| missing(DIVIDEND_KEY))?,
            exchange: self
                .get_engine::<ExchangeEngine>(EXCHANGE_KEY)?
                .ok_or_else(|| missing(EXCHANGE_KEY))?,
            storage: self
                .get_engine::<DataStorageMarket>(STORAGE_KEY)?
                .ok_or_else(|| missing(STORAGE_KEY))?,
        }))
    }

    fn get_engine<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DmcError> {
        match self.engines.get(key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Store `events` under consecutive indices starting at `first`.
    pub fn append_events(&self, first: u64, events: &[Event]) -> Result<(), DmcError> {
        let mut batch = sled::Batch::default();
        for (i, event) in events.iter().enumerate() {
            batch.insert((first + i as u64).to_be_bytes().to_vec(), encode(event)?);
        }
        self.events.apply_batch(batch).map_err(storage_err)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Events with index `from` and later, in order.
    pub fn events_since(&self, from: u64) -> Result<Vec<Event>, DmcError> {
        let mut out = Vec::new();
        for item in self.events.range(from.to_be_bytes()..) {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), DmcError> {
        self.meta.insert(key.as_bytes(), value).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, DmcError> {
        self.meta
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(storage_err)
    }

    /// Number of transactions applied since genesis.
    pub fn tx_count(&self) -> Result<u64, DmcError> {
        match self.get_meta("tx_count")? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| DmcError::Serialization("tx_count is not 8 bytes".into()))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), DmcError> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }
}
