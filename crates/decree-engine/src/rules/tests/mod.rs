mod attributes;
mod common;
mod publish;
