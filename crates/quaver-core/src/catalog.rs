//! Track catalog types
//!
//! The catalog is supplied once at startup by an external loader; the
//! engine only reads it. Tracks are referenced everywhere else by their
//! locator, never by index or id.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;


/// Errors that can occur while building a catalog.
#[derive( Debug, Error )]
pub enum CatalogError {
    #[error( "Duplicate locator in catalog: {0}" )]
    DuplicateLocator( Locator ),
}


/// Identifier for one playable audio resource, unique per catalog track.
#[derive( Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord )]
pub struct Locator( String );


impl Locator {
    pub fn new( locator: impl Into<String> ) -> Self {
        Self( locator.into() )
    }


    pub fn as_str( &self ) -> &str {
        &self.0
    }
}


impl fmt::Display for Locator {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( &self.0 )
    }
}


impl From<&str> for Locator {
    fn from( s: &str ) -> Self {
        Self( s.to_string() )
    }
}


impl From<String> for Locator {
    fn from( s: String ) -> Self {
        Self( s )
    }
}


/// One playable track as described by the catalog.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct Track {
    pub id: u64,
    pub locator: Locator,
    pub title: String,
}


impl Track {
    pub fn new( id: u64, locator: impl Into<Locator>, title: impl Into<String> ) -> Self {
        Self {
            id,
            locator: locator.into(),
            title: title.into(),
        }
    }
}


/// Immutable set of tracks the engine is allowed to play.
#[derive( Debug, Default )]
pub struct Catalog {
    tracks: Vec<Track>,
    // Locator → index into `tracks`
    index: HashMap<Locator, usize>,
}


impl Catalog {
    /// Builds a catalog, rejecting duplicate locators.
    ///
    /// @param tracks - Track records from the external loader
    ///
    /// @returns The catalog, or the first duplicate locator found
    pub fn from_tracks( tracks: Vec<Track> ) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity( tracks.len() );

        for ( i, track ) in tracks.iter().enumerate() {
            if index.insert( track.locator.clone(), i ).is_some() {
                return Err( CatalogError::DuplicateLocator( track.locator.clone() ) );
            }
        }

        Ok( Self { tracks, index } )
    }


    /// Looks up a track by locator.
    pub fn get( &self, locator: &Locator ) -> Option<&Track> {
        self.index.get( locator ).and_then( |i| self.tracks.get( *i ) )
    }


    /// Checks whether a locator belongs to this catalog.
    pub fn contains( &self, locator: &Locator ) -> bool {
        self.index.contains_key( locator )
    }


    /// Gets all tracks in catalog order.
    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    /// Gets the number of tracks.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Returns true if the catalog is empty.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_from_tracks_indexes_by_locator() {
        let catalog = Catalog::from_tracks( vec![
            Track::new( 1, "a.mp3", "First" ),
            Track::new( 2, "b.mp3", "Second" ),
        ]).unwrap();

        assert_eq!( catalog.len(), 2 );
        assert!( catalog.contains( &Locator::from( "a.mp3" ) ) );
        assert_eq!( catalog.get( &Locator::from( "b.mp3" ) ).unwrap().title, "Second" );
        assert!( catalog.get( &Locator::from( "c.mp3" ) ).is_none() );
    }


    #[test]
    fn test_from_tracks_rejects_duplicate_locator() {
        let result = Catalog::from_tracks( vec![
            Track::new( 1, "a.mp3", "First" ),
            Track::new( 2, "a.mp3", "Same file again" ),
        ]);

        assert!( matches!( result, Err( CatalogError::DuplicateLocator( l ) ) if l.as_str() == "a.mp3" ) );
    }


    #[test]
    fn test_locator_display() {
        let locator = Locator::new( "https://example.com/theme.mp3" );
        assert_eq!( locator.to_string(), "https://example.com/theme.mp3" );
        assert_eq!( locator.as_str(), "https://example.com/theme.mp3" );
    }
}
