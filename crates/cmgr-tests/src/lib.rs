//! Empty library crate — this package exists only to host `tests/`.
