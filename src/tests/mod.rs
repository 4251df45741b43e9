// Test modules for portmapper
// Each module covers the corresponding source module

mod config_tests;
