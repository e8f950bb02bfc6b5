//! Published crawler ranges: parsing, snapshots, sources and matching.

mod cidr;
mod matcher;
#[cfg(feature = "native")]
mod refresh;
mod snapshot;
mod source;

pub use cidr::{parse_address, CidrBlock, Ipv4Block, Ipv6Block};
pub use matcher::RangeMatcher;
#[cfg(feature = "native")]
pub use refresh::{spawn_refresh_task, RefreshHandle};
pub use snapshot::{PrefixEntry, PrefixList, RangeDocument, RangeSet, RangeSnapshot};
pub use source::{
    EmbeddedRangeSource, RangeSource, RefreshPolicy, RemoteRangeSource, BUNDLED_RANGES,
};
