pub mod ad_slot;
pub mod dashboard;
pub mod loading_skeleton;
pub mod parking_card;
