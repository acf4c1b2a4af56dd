pub mod script_transport;
