pub mod control_dto;
