// Domain layer - models own all SQL

pub mod website;
