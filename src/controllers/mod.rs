pub mod control_controller;
