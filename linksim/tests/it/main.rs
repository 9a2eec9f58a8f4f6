mod driver;
mod properties;
mod scenarios;
