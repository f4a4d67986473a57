pub mod link_statuses;
