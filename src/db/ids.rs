//! Snowflake-style 64-bit id generation.
//!
//! Layout, high to low: 41 bits of milliseconds since [`EPOCH_MS`], 10 bits
//! of node id, 12 bits of per-millisecond sequence.

use std::sync::Mutex;

/// 2010-11-04T01:42:54.657Z, the conventional snowflake epoch.
pub const EPOCH_MS: i64 = 1_288_834_974_657;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_NODE: u16 = (1 << NODE_BITS) - 1;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

pub const USER_NODE: u16 = 1;
pub const USER_CONFIG_NODE: u16 = 2;
pub const SERVER_NODE: u16 = 3;
pub const SERVER_CONFIG_NODE: u16 = 4;

#[derive(Debug)]
struct State {
    last_ms: i64,
    sequence: i64,
}

/// Generates strictly increasing ids for one entity kind.
#[derive(Debug)]
pub struct IdGenerator {
    node: i64,
    state: Mutex<State>,
}

impl IdGenerator {
    /// Node ids above 1023 are masked to 10 bits.
    pub fn new(node: u16) -> Self {
        Self {
            node: i64::from(node & MAX_NODE),
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn next_id(&self) -> i64 {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut now = now_ms();
        // A clock step backwards reuses the last timestamp so ids keep growing.
        if now < state.last_ms {
            now = state.last_ms;
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond; borrow the next one.
                now = state.last_ms + 1;
                while now_ms() < now {
                    std::hint::spin_loop();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        ((now - EPOCH_MS) << (NODE_BITS + SEQUENCE_BITS))
            | (self.node << SEQUENCE_BITS)
            | state.sequence
    }
}

/// One generator per entity kind.
#[derive(Debug)]
pub struct IdGenerators {
    pub users: IdGenerator,
    pub user_configs: IdGenerator,
    pub servers: IdGenerator,
    pub server_configs: IdGenerator,
}

impl Default for IdGenerators {
    fn default() -> Self {
        Self {
            users: IdGenerator::new(USER_NODE),
            user_configs: IdGenerator::new(USER_CONFIG_NODE),
            servers: IdGenerator::new(SERVER_NODE),
            server_configs: IdGenerator::new(SERVER_CONFIG_NODE),
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
