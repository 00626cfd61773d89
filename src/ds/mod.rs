pub mod access_history;
pub mod bloom;
pub mod key_index;
pub mod rank_index;

pub use access_history::AccessHistory;
pub use bloom::{BloomFilter, BloomStats};
pub use key_index::{split_key, KeyIndex, KeyIndexStats};
pub use rank_index::{Rank, RankIndex};
