//! Tests for the address book.

mod vectors;
