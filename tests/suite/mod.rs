mod connection;
mod diagnostics;
mod generation;
mod scenarios;
