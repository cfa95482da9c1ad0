//! End-to-end walkthroughs covering point search, WKT intersection,
//! duplicate layer creation and bulk loading.

mod scenario_test;
