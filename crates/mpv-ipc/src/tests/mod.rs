//! Behavioural suites driving a client against a fake mpv.

mod support;
