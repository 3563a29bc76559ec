pub mod taskdtos;
