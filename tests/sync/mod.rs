mod delivery_tests;
mod ordering_tests;
mod reconciliation_tests;
