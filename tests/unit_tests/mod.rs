mod basis;
mod cache;
mod domain;
mod topology;
