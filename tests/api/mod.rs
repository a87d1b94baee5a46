mod health_tests;
mod message_tests;
mod websocket_tests;
