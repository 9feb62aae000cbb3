pub mod use_parking_store;
