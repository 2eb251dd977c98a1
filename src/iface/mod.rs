/*! Network interface logic.

The `iface` module deals with the *IGMP host duties* of a network interface.
It validates incoming IGMP messages, tracks group membership and source
filters, and emits the reports that keep multicast routers informed.
*/

pub mod dispatch;
mod host;
mod interface;

pub use self::dispatch::Handler;
pub use self::host::{
    Config, FilterMode, Group, GroupState, Host, MulticastError, SourceEntry, SourceFiltering,
    SourceList,
};
pub use self::interface::Interface;
