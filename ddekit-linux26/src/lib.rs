//! Linux 2.6 page allocator symbols for drivers hosted on DDE kit.
//!
//! The page cache is initialized by a load-time constructor from
//! `/etc/ddekit/pages.toml`; hosts may also call `ddekit_pages_init`.

/// DDE page cache hooks
mod dde;

mod exports;
