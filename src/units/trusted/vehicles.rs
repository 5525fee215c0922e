//! Motor vehicle collisions: vehicles involved.

use crate::config::CleaningSettings;
use crate::core::stage::{RegistryError, UnitArgs};
use crate::domain::{Dataset, DatasetError};
use crate::units::ProcessingUnit;

use super::fuzzy::Vocabulary;
use super::{steps, SourceFilter, TrustedTemplate, TrustedUnit};

pub const UNIT_NAME: &str = "mvc_vehicles_trusted";
pub const TABLE_NAME: &str = "mvc_vehicles";

pub const UNKNOWN_TYPE: &str = "Unknown Vehicle";
pub const UNKNOWN_MAKE: &str = "Unknown";

const KEEP: &[&str] = &[
    "collision_id",
    "crash_date",
    "crash_time",
    "vehicle_id",
    "vehicle_type",
    "vehicle_make",
    "vehicle_model",
    "vehicle_year",
    "driver_sex",
    "driver_license_status",
    "driver_license_jurisdiction",
    "pre_crash",
    "point_of_impact",
    "vehicle_damage",
    "vehicle_damage_1",
    "vehicle_damage_2",
    "vehicle_damage_3",
];

const DAMAGE_COLUMNS: [&str; 4] = [
    "vehicle_damage",
    "vehicle_damage_1",
    "vehicle_damage_2",
    "vehicle_damage_3",
];

const VEHICLE_TYPES: &[&str] = &[
    "2-Door Sedan",
    "3-Door Vehicle",
    "4-Door Sedan",
    "All-Terrain Vehicle",
    "Ambulance",
    "Armored Truck",
    "Backhoe Loader",
    "Beverage Truck",
    "Bike",
    "Bicycle",
    "Bobcat",
    "Boom Lift",
    "Box Truck",
    "Bulldozer",
    "Bus",
    "Camper Van",
    "Car Carrier",
    "Cargo Van",
    "Carriage",
    "Cement Mixer",
    "Cherry Picker",
    "City Vehicle",
    "Concrete Mixer",
    "Construction Vehicle",
    "Convertible",
    "Courier Van",
    "Crane",
    "Delivery Truck",
    "Dirt Bike",
    "Dump Truck",
    "Electric Bike (E-Bike)",
    "Electric Scooter (E-Scooter)",
    "Excavator",
    "Fire Engine",
    "Fire Truck",
    "Flatbed Truck",
    "Forklift",
    "Garbage Truck",
    "Golf Cart",
    "Government Vehicle",
    "Grain Truck",
    "Hearse",
    "Horse Carriage",
    "Ice Cream Truck",
    "Jet Ski",
    "Ladder Truck",
    "Lawn Mower",
    "Lift Boom",
    "Limousine",
    "Livestock Rack",
    "Mail Truck",
    "Minibike",
    "Minivan",
    "Moped",
    "Motor Home",
    "Motor Scooter",
    "Motorcycle",
    "Omnibus",
    "Open Body Truck",
    "Other",
    "Passenger Vehicle",
    "Pedicab",
    "Pickup Truck",
    "Police Vehicle",
    "Postal Vehicle",
    "Power Shovel",
    "Refrigerated Van",
    "Road Sweeper",
    "Scooter",
    "Sedan",
    "Semi-Trailer",
    "Skateboard",
    "Skid Steer Loader",
    "Snow Plow",
    "Special Purpose Vehicle",
    "Sport Utility Vehicle (SUV)",
    "Stake Truck",
    "Station Wagon",
    "Street Sweeper",
    "Suburban",
    "Sweeper Truck",
    "Tank Truck",
    "Taxi",
    "Tow Truck",
    "Tractor",
    "Tractor Trailer",
    "Trailer",
    "Trash Truck",
    "Truck",
    "Utility Vehicle",
    "Van",
    "Wheelchair",
    "Work Van",
    "Unknown Vehicle",
];

const VEHICLE_MAKES: &[&str] = &[
    "Alfa Romeo",
    "Ankai",
    "Apollo",
    "Autocar",
    "Big Dog",
    "Blue Bird",
    "Bobcat",
    "Bombardier",
    "Can-Am",
    "Caterpillar",
    "Chevrolet",
    "Chrysler",
    "Club Car",
    "Collins Bus",
    "Crane Carrier",
    "Dodge",
    "E-One",
    "Ferrara",
    "Ford",
    "Freightliner",
    "Genuine Scooters",
    "Gillig",
    "Great Dane",
    "Grumman",
    "Harley-Davidson",
    "Hino",
    "Honda",
    "Hyundai",
    "IC Bus",
    "International",
    "Isuzu",
    "JLG",
    "John Deere",
    "Kenworth",
    "KME",
    "Kubota",
    "Kymco",
    "Liebherr",
    "Mack",
    "Manitou",
    "Mercedes-Benz",
    "MCI",
    "Mini",
    "Mitsubishi",
    "Navistar International",
    "New Flyer",
    "Nissan",
    "Nova Bus",
    "Orion",
    "Oshkosh",
    "Peterbilt",
    "Pierce",
    "Polaris",
    "Prevost",
    "RAM",
    "Rosenbauer",
    "Seagrave",
    "Setra",
    "Sterling",
    "Thomas Built Buses",
    "Toyota",
    "Triumph",
    "U-Haul",
    "Utility Trailer Manufacturing Company",
    "Van Hool",
    "Vauxhall",
    "Volvo",
    "Western Star",
    "Workhorse",
    "Yamaha",
    "Alexander Dennis",
    "Case",
    "Cushman",
    "E-Z-GO",
    "Genie",
    "Grove",
    "Hyster",
    "JCB",
    "Komatsu",
    "Manac",
    "Terex",
    "Piaggio",
    "Bajaj",
    "Daewoo",
    "Fiat",
    "Suzuki",
    "Kawasaki",
    "Victory",
    "MV Agusta",
    "Benelli",
    "Aprilia",
    "SYM",
    "Mahindra",
    "Foton",
    "Hyosung",
    "GMC",
    "Scania",
    "Renault",
    "Iveco",
    "DAF",
    "Dennis",
    "Tesla",
    "Lucid",
    "Rivian",
    "BYD",
    "Proterra",
    "Marcopolo",
    "Neoplan",
    "Optare",
    "Solaris",
    "Temsa",
    "Yutong",
    "Zhongtong",
    "King Long",
    "Ashok Leyland",
    "Tata",
    "Mazda",
    "Subaru",
    "Jeep",
    "Land Rover",
    "Jaguar",
    "Cadillac",
    "Buick",
    "Lincoln",
    "Chery",
    "Geely",
    "Haval",
    "Saab",
    "Skoda",
    "Seat",
    "Ducati",
    "Husqvarna",
    "Bimota",
    "Gas Gas",
    "Royal Enfield",
    "Zero Motorcycles",
    "Energica",
    "Niu",
    "Segway",
    "Ninebot",
    "Bird",
    "Lime",
    "Boosted",
    "Gotrax",
    "Emove",
    "Kaabo",
    "Dualtron",
    "Varla",
    "Nanrobot",
    "Xiaomi",
    "Inokim",
    "Glion",
    "Razor",
    "E-Twow",
    "Swagtron",
    "Mercane",
    "SoFlow",
    "Unagi",
    "EV Rider",
    "Hover-1",
    "Qiewa",
    "Kugoo",
    "Vsett",
    "Surron",
    "Super73",
    "Rad Power Bikes",
    "VanMoof",
    "Juiced Bikes",
    "Aventon",
    "Lectric",
    "Cowboy",
    "Brompton",
    "Gazelle",
    "Yuba",
    "Tern",
    "Blix",
    "Pedego",
    "Ancheer",
    "Flyer",
    "Electric Bike Company",
    "Addmotor",
    "Haibike",
    "Frey",
    "Riese & Müller",
    "Bianchi",
    "Specialized",
    "Giant",
    "Trek",
    "Cannondale",
    "Santa Cruz",
    "Scott",
    "Orbea",
    "KTM",
    "Canyon",
    "Merida",
    "Cube",
    "Ghost",
    "Polygon",
];

/// Reference vocabulary of vehicle types
pub fn vehicle_types() -> Vocabulary {
    Vocabulary::new(VEHICLE_TYPES)
}

/// Reference vocabulary of vehicle makes
pub fn vehicle_makes() -> Vocabulary {
    Vocabulary::new(VEHICLE_MAKES)
}

fn drop_insignificant(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    Ok(data.select(KEEP))
}

fn deduplicate(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    Ok(data.dedup_by(&["collision_id"]))
}

fn correct_categoricals(data: Dataset, settings: &CleaningSettings) -> Result<Dataset, DatasetError> {
    let cutoff = settings.fuzzy_cutoff;
    let types = vehicle_types();
    let makes = vehicle_makes();
    Ok(data
        .map_column("vehicle_type", |v| types.correct(v, cutoff, UNKNOWN_TYPE))
        .map_column("vehicle_make", |v| makes.correct(v, cutoff, UNKNOWN_MAKE)))
}

fn format(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    let data = steps::one_hot_union(data, &DAMAGE_COLUMNS, None)?;
    steps::combine_datetime(data, "crash_date", "crash_time", "crash_datetime")
}

/// Cleaning pipeline for vehicle records
pub fn template() -> TrustedTemplate {
    TrustedTemplate::new(
        UNIT_NAME,
        TABLE_NAME,
        SourceFilter::Prefix("motor_vehicle_collisions_vehicles_"),
    )
    .drop_insignificant(drop_insignificant)
    .deduplicate(deduplicate)
    .correct_categoricals(correct_categoricals)
    .format(format)
}

/// Registry constructor
pub fn build(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    TrustedUnit::boxed(template(), args)
}
