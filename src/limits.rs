//! Static input limits enforced before anything reaches the store.

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 4_000;
pub const MAX_LINK_LEN: usize = 2_048;
pub const MAX_OWNER_ID_LEN: usize = 256;

/// Upper bound on reservations held for one venue on one date.
pub const MAX_RESERVATIONS_PER_DAY: usize = 1_440;

/// Longest accepted request line on the line-protocol server.
pub const MAX_REQUEST_LINE_LEN: usize = 64 * 1024;
